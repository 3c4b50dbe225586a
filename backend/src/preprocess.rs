use image::{ImageReader, Limits, RgbImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};
use std::io::Cursor;

/// Side length of the square input the model was trained on.
pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// Largest accepted width or height. Keeps a tiny, highly compressed upload
/// from expanding into gigabytes of pixels.
pub const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("upload is empty")]
    Empty,
    #[error("unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
    #[error("could not read image header: {0}")]
    Io(#[from] std::io::Error),
    #[error("image has no pixels ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
}

/// `[1, 224, 224, 3]` tensor of pixel values in `0.0..=255.0`, channels last.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// The single image in the batch, `[H, W, C]`.
    pub fn instance(&self) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }
}

/// Decodes `bytes`, stretches the image to `INPUT_SIZE` square with bilinear
/// interpolation and adds a batch axis. Alpha is dropped, grayscale is
/// expanded to three channels.
pub fn to_tensor(bytes: &[u8]) -> Result<ImageTensor, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DIMENSION);
    limits.max_image_height = Some(MAX_DIMENSION);

    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits);
    let decoded = reader.decode()?;

    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSized { width, height });
    }
    log::debug!("Decoded {}x{} image ({:?})", width, height, decoded.color());

    let instance = resize_bilinear(&decoded.to_rgb8(), INPUT_SIZE as usize);
    Ok(ImageTensor {
        data: instance.insert_axis(Axis(0)),
    })
}

/// Source rows (or columns) blended into one output row, and the weight of
/// the second one.
type Span = (usize, usize, f32);

/// Output index `i` reads source position `i * in / out` (corners not
/// aligned, no half-pixel offset), blending its two nearest neighbours.
fn spans(in_len: usize, out_len: usize) -> Vec<Span> {
    let ratio = in_len as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let lo = (src.floor() as usize).min(in_len - 1);
            let hi = (src.ceil() as usize).min(in_len - 1);
            (lo, hi, (src - lo as f64) as f32)
        })
        .collect()
}

fn resize_bilinear(image: &RgbImage, side: usize) -> Array3<f32> {
    let (in_w, in_h) = (image.width() as usize, image.height() as usize);
    let raw = image.as_raw();
    let at = |x: usize, y: usize, c: usize| f32::from(raw[(y * in_w + x) * CHANNELS + c]);

    let y_lut = spans(in_h, side);
    let x_lut = spans(in_w, side);

    Array3::from_shape_fn((side, side, CHANNELS), |(y, x, c)| {
        let (y0, y1, wy) = y_lut[y];
        let (x0, x1, wx) = x_lut[x];
        let top = at(x0, y0, c) + (at(x1, y0, c) - at(x0, y0, c)) * wx;
        let bottom = at(x0, y1, c) + (at(x1, y1, c) - at(x0, y1, c)) * wx;
        top + (bottom - top) * wy
    })
}
