//! Spatial ordering of the members of one volume.
//!
//! Slices are stacked along the normal of their shared image plane: each
//! position is projected onto `row × column` and files are sorted by that
//! distance. Projecting instead of reading the z coordinate keeps tilted
//! acquisitions (gantry tilt) in the right order.

use crate::{
    config::{EPSILON, SPACING_CV_THRESHOLD},
    enums::{SortKey, SortStatus},
    record::FileRecord,
};

use std::cmp::Ordering;
use tracing::debug;

/// Tolerances used while sorting.
#[derive(Debug, Clone, Copy)]
pub struct SortOptions {
    pub epsilon: f64,
    pub spacing_cv_threshold: f64,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            epsilon: EPSILON,
            spacing_cv_threshold: SPACING_CV_THRESHOLD,
        }
    }
}

/// Ordered members of a volume plus what was learned while ordering them.
#[derive(Debug, Clone)]
pub struct SortOutcome<'a> {
    pub files: Vec<&'a FileRecord>,
    pub status: SortStatus,
    pub key: SortKey,
    /// Unit slice normal, when the orientation was consistent.
    pub normal: Option<[f64; 3]>,
    /// Mean distance between consecutive slices along the normal.
    pub spacing: Option<f64>,
    /// Angle between the stacking direction and the slice normal.
    pub tilt_degrees: Option<f64>,
}

impl<'a> SortOutcome<'a> {
    fn fallback(files: Vec<&'a FileRecord>, status: SortStatus, key: SortKey) -> Self {
        Self {
            files,
            status,
            key,
            normal: None,
            spacing: None,
            tilt_degrees: None,
        }
    }
}

/// Order `files` along their slice normal.
///
/// Never fails: inconsistent geometry degrades to a fallback order and is
/// reported through [`SortOutcome::status`].
pub fn sort<'a>(files: &[&'a FileRecord], options: &SortOptions) -> SortOutcome<'a> {
    let mut files = files.to_vec();
    files.sort_by_key(|record| record.discovery());

    if files.len() <= 1 {
        let spacing = files.first().and_then(|record| record.spacing_hint());
        return SortOutcome {
            spacing,
            ..SortOutcome::fallback(files, SortStatus::Ok, SortKey::Discovery)
        };
    }

    let Some(normal) = shared_normal(&files, options.epsilon) else {
        debug!("orientation differs between slices, ordering by file name");
        files.sort_by(|a, b| a.name().cmp(b.name()));
        return SortOutcome::fallback(files, SortStatus::Heterogeneous, SortKey::FileName);
    };

    let positions: Option<Vec<[f64; 3]>> = files.iter().map(|record| record.position()).collect();
    let Some(positions) = positions else {
        let key = if files.iter().all(|record| record.instance_number().is_some()) {
            files.sort_by_key(|record| record.instance_number());
            SortKey::InstanceNumber
        } else {
            SortKey::Discovery
        };
        debug!("slice position missing, ordering by {key:?}");
        return SortOutcome {
            normal: Some(normal),
            ..SortOutcome::fallback(files, SortStatus::PositionMissing, key)
        };
    };

    let mut projected: Vec<(f64, [f64; 3], &'a FileRecord)> = files
        .iter()
        .zip(&positions)
        .map(|(&record, &position)| (dot(position, normal), position, record))
        .collect();
    projected.sort_by(|a, b| a.0.total_cmp(&b.0));
    order_ties_by_discovery(&mut projected, options.epsilon);

    let distances: Vec<f64> = projected.iter().map(|(distance, _, _)| *distance).collect();
    let (spacing, regular) = spacing_stats(&distances, options);

    let first = projected[0].1;
    let last = projected[projected.len() - 1].1;
    let tilt_degrees = tilt(sub(last, first), normal);
    if let Some(tilt) = tilt_degrees.filter(|t| *t > 0.01) {
        debug!("slices are stacked {tilt:.2}° off their normal");
    }

    SortOutcome {
        files: projected.into_iter().map(|(_, _, record)| record).collect(),
        status: if regular {
            SortStatus::Ok
        } else {
            SortStatus::IrregularSpacing
        },
        key: SortKey::ImagePositionPatient,
        normal: Some(normal),
        spacing: Some(spacing),
        tilt_degrees,
    }
}

/// Unit normal shared by every file, `None` if any orientation is missing,
/// degenerate or differs from the first one.
fn shared_normal(files: &[&FileRecord], epsilon: f64) -> Option<[f64; 3]> {
    let reference = files.first()?.orientation()?;
    for record in &files[1..] {
        let orientation = record.orientation()?;
        if !reference
            .iter()
            .zip(&orientation)
            .all(|(&a, &b)| approx_eq(a, b, epsilon))
        {
            return None;
        }
    }
    let row = [reference[0], reference[1], reference[2]];
    let column = [reference[3], reference[4], reference[5]];
    normalize(cross(row, column))
}

/// Within runs of equal (within `epsilon`) distances, restore discovery order.
fn order_ties_by_discovery(projected: &mut [(f64, [f64; 3], &FileRecord)], epsilon: f64) {
    let mut start = 0;
    while start < projected.len() {
        let mut end = start + 1;
        while end < projected.len() && approx_eq(projected[end - 1].0, projected[end].0, epsilon) {
            end += 1;
        }
        projected[start..end].sort_by_key(|(_, _, record)| record.discovery());
        start = end;
    }
}

/// Mean gap between sorted distances and whether the gaps are uniform.
///
/// Coincident slices (mean gap within `epsilon`) count as irregular.
fn spacing_stats(distances: &[f64], options: &SortOptions) -> (f64, bool) {
    let gaps: Vec<f64> = distances.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return (0.0, true);
    }
    let n = gaps.len() as f64;
    let mean = gaps.iter().sum::<f64>() / n;
    if mean <= options.epsilon {
        return (mean, false);
    }
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    (mean, cv <= options.spacing_cv_threshold)
}

fn tilt(direction: [f64; 3], normal: [f64; 3]) -> Option<f64> {
    let direction = normalize(direction)?;
    let cos = dot(direction, normal).abs().min(1.0);
    Some(cos.acos().to_degrees())
}

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon * 1f64.max(a.abs()).max(b.abs())
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let norm = dot(v, v).sqrt();
    match norm.partial_cmp(&EPSILON) {
        Some(Ordering::Greater) => Some([v[0] / norm, v[1] / norm, v[2] / norm]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TagValue;
    use dicom::core::Tag;
    use dicom_dictionary_std::tags;
    use std::collections::BTreeMap;

    const AXIAL: &str = "1\\0\\0\\0\\1\\0";

    fn slice(
        name: &str,
        discovery: usize,
        position: Option<[f64; 3]>,
        orientation: Option<&str>,
        instance: Option<i64>,
    ) -> FileRecord {
        let mut tags_map: BTreeMap<Tag, TagValue> = BTreeMap::new();
        tags_map.insert(tags::SERIES_INSTANCE_UID, TagValue::Str("S1".into()));
        if let Some([x, y, z]) = position {
            tags_map.insert(
                tags::IMAGE_POSITION_PATIENT,
                TagValue::Str(format!("{x}\\{y}\\{z}")),
            );
        }
        if let Some(orientation) = orientation {
            tags_map.insert(tags::IMAGE_ORIENTATION_PATIENT, TagValue::Str(orientation.into()));
        }
        if let Some(instance) = instance {
            tags_map.insert(tags::INSTANCE_NUMBER, TagValue::Str(instance.to_string()));
        }
        FileRecord::from_tags(name, name, discovery, tags_map)
    }

    fn axial(name: &str, discovery: usize, z: f64) -> FileRecord {
        slice(name, discovery, Some([0.0, 0.0, z]), Some(AXIAL), None)
    }

    fn run(files: &[FileRecord]) -> (Vec<String>, SortStatus) {
        let refs: Vec<&FileRecord> = files.iter().collect();
        let outcome = sort(&refs, &SortOptions::default());
        (
            outcome.files.iter().map(|r| r.name().to_string()).collect(),
            outcome.status,
        )
    }

    #[test]
    fn orders_by_position_along_normal() {
        let files = vec![axial("c", 0, 20.0), axial("a", 1, 0.0), axial("b", 2, 10.0)];
        assert_eq!(run(&files), (vec!["a".into(), "b".into(), "c".into()], SortStatus::Ok));
    }

    #[test]
    fn reversed_positions_reverse_order() {
        let files = vec![axial("c", 0, -20.0), axial("a", 1, 0.0), axial("b", 2, -10.0)];
        assert_eq!(run(&files), (vec!["c".into(), "b".into(), "a".into()], SortStatus::Ok));
    }

    #[test]
    fn single_file_is_ok() {
        let files = vec![slice("a", 0, None, None, None)];
        let refs: Vec<&FileRecord> = files.iter().collect();
        let outcome = sort(&refs, &SortOptions::default());
        assert_eq!(outcome.status, SortStatus::Ok);
        assert_eq!(outcome.files.len(), 1);
    }

    #[test]
    fn coincident_positions_keep_discovery_order() {
        let files = vec![axial("z", 0, 5.0), axial("a", 1, 5.0), axial("m", 2, 5.00000001)];
        let (names, status) = run(&files);
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(status, SortStatus::IrregularSpacing);
    }

    #[test]
    fn near_duplicate_ties_use_discovery_not_name() {
        let files = vec![
            axial("b", 0, 0.0),
            axial("d", 1, 10.0),
            axial("c", 2, 10.0 + 1e-7),
            axial("a", 3, 20.0),
        ];
        let (names, status) = run(&files);
        assert_eq!(names, vec!["b", "d", "c", "a"]);
        assert_eq!(status, SortStatus::IrregularSpacing);
    }

    #[test]
    fn sagittal_stack_uses_x() {
        // rows along y, columns along z: normal is +x
        let orientation = "0\\1\\0\\0\\0\\1";
        let files = vec![
            slice("b", 0, Some([2.0, 100.0, 50.0]), Some(orientation), None),
            slice("a", 1, Some([1.0, 100.0, 50.0]), Some(orientation), None),
            slice("c", 2, Some([3.0, 100.0, 50.0]), Some(orientation), None),
        ];
        assert_eq!(run(&files), (vec!["a".into(), "b".into(), "c".into()], SortStatus::Ok));
    }

    #[test]
    fn gantry_tilt_is_sorted_along_normal() {
        // plane tilted 20° about x, each slice shifted in-plane along the columns
        let angle = 20f64.to_radians();
        let (s, c) = angle.sin_cos();
        let orientation = format!("1\\0\\0\\0\\{c}\\{s}");
        let normal = [0.0, -s, c];
        let column = [0.0, c, s];
        let files: Vec<FileRecord> = [2.0, 0.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let position = [
                    0.0,
                    normal[1] * k * 5.0 + column[1] * k * 3.0,
                    normal[2] * k * 5.0 + column[2] * k * 3.0,
                ];
                slice(&format!("s{k}"), i, Some(position), Some(&orientation), None)
            })
            .collect();
        let refs: Vec<&FileRecord> = files.iter().collect();
        let outcome = sort(&refs, &SortOptions::default());
        let names: Vec<_> = outcome.files.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["s0", "s1", "s2"]);
        assert_eq!(outcome.status, SortStatus::Ok);
        assert!(outcome.tilt_degrees.unwrap() > 1.0);
        assert!((outcome.spacing.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn heterogeneous_orientation_falls_back_to_name() {
        let files = vec![
            slice("b", 0, Some([0.0, 0.0, 0.0]), Some(AXIAL), None),
            slice("a", 1, Some([0.0, 0.0, 1.0]), Some("0\\1\\0\\0\\0\\-1"), None),
            slice("c", 2, Some([0.0, 0.0, 2.0]), Some(AXIAL), None),
        ];
        assert_eq!(
            run(&files),
            (vec!["a".into(), "b".into(), "c".into()], SortStatus::Heterogeneous)
        );
    }

    #[test]
    fn orientation_within_epsilon_is_shared() {
        let files = vec![
            slice("a", 0, Some([0.0, 0.0, 0.0]), Some(AXIAL), None),
            slice("b", 1, Some([0.0, 0.0, 1.0]), Some("1\\0.00001\\0\\0\\1\\0"), None),
        ];
        assert_eq!(run(&files).1, SortStatus::Ok);
    }

    #[test]
    fn missing_position_uses_instance_number() {
        let files = vec![
            slice("a", 0, None, Some(AXIAL), Some(3)),
            slice("b", 1, Some([0.0, 0.0, 1.0]), Some(AXIAL), Some(1)),
            slice("c", 2, Some([0.0, 0.0, 2.0]), Some(AXIAL), Some(2)),
        ];
        let refs: Vec<&FileRecord> = files.iter().collect();
        let outcome = sort(&refs, &SortOptions::default());
        let names: Vec<_> = outcome.files.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert_eq!(outcome.status, SortStatus::PositionMissing);
        assert_eq!(outcome.key, SortKey::InstanceNumber);
    }

    #[test]
    fn missing_position_without_instance_keeps_discovery() {
        let files = vec![
            slice("c", 0, None, Some(AXIAL), None),
            slice("a", 1, Some([0.0, 0.0, 1.0]), Some(AXIAL), Some(1)),
        ];
        let refs: Vec<&FileRecord> = files.iter().collect();
        let outcome = sort(&refs, &SortOptions::default());
        let names: Vec<_> = outcome.files.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(outcome.key, SortKey::Discovery);
    }

    #[test]
    fn irregular_spacing_is_flagged_but_sorted() {
        let files = vec![
            axial("a", 0, 0.0),
            axial("b", 1, 1.0),
            axial("c", 2, 2.0),
            axial("d", 3, 10.0),
        ];
        assert_eq!(
            run(&files),
            (
                vec!["a".into(), "b".into(), "c".into(), "d".into()],
                SortStatus::IrregularSpacing
            )
        );
    }
}
