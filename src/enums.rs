use serde::{Deserialize, Serialize};

/// Outcome of ordering the members of one volume.
///
/// Only `Ok` guarantees a spatially monotonic stack. Every other status is
/// a diagnostic: the volume is still emitted, in a best-effort order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortStatus {
    #[default]
    Ok,
    /// Members disagree on ImageOrientationPatient (or some lack it).
    Heterogeneous,
    /// At least one member lacks ImagePositionPatient.
    PositionMissing,
    /// Projected positions are not evenly spaced.
    IrregularSpacing,
}

impl SortStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SortStatus::Ok)
    }
}

/// The key a volume ended up being ordered by.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    /// Projection of ImagePositionPatient onto the slice normal.
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    FileName,
    /// The order in which the files were handed to the loader.
    Discovery,
}

/// Sample type of an extracted raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl SampleType {
    /// Sample type from BitsAllocated and PixelRepresentation (0 unsigned, 1 signed).
    pub fn from_bits(bits_allocated: u16, pixel_representation: u16) -> Option<Self> {
        let signed = pixel_representation == 1;
        match (bits_allocated, signed) {
            (8, false) => Some(SampleType::U8),
            (8, true) => Some(SampleType::I8),
            (16, false) => Some(SampleType::U16),
            (16, true) => Some(SampleType::I16),
            (32, false) => Some(SampleType::U32),
            (32, true) => Some(SampleType::I32),
            _ => None,
        }
    }
}
