use ndarray::{Array2, ArrayView2, Zip};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Dimensions of a `width` x `height` image shrunk to fit in a
    /// `max_size` square, keeping its aspect ratio. Never enlarges.
    pub(crate) fn fit_within(width: u32, height: u32, max_size: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= max_size || max_size == 0 {
            return (width, height);
        }
        let scale = max_size as f32 / longest as f32;
        let new_width = ((width as f32 * scale).round() as u32).max(1);
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        (new_width, new_height)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Resample `slice` to `width` x `height` with bilinear interpolation.
    pub(crate) fn resize(slice: &ArrayView2<f32>, width: u32, height: u32) -> Array2<f32> {
        let (slice_height, slice_width) = slice.dim();
        let mut output = Array2::<f32>::zeros((height as usize, width as usize));
        if slice_height == 0 || slice_width == 0 {
            return output;
        }

        Zip::indexed(&mut output).par_for_each(|(y, x), value| {
            // normalized coordinates with half-pixel offset
            let norm_x = (x as f32 + 0.5) / width as f32;
            let norm_y = (y as f32 + 0.5) / height as f32;

            let src_x = norm_x * slice_width as f32 - 0.5;
            let src_y = norm_y * slice_height as f32 - 0.5;

            let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
            let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

            *value = Self::bilinear_interpolate(slice, src_y, src_x);
        });

        output
    }
}
