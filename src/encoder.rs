//! Quantizes an RGBA snapshot into the byte frame the matrix firmware reads.
//!
//! Each pixel becomes one byte with 3 bits of red, 3 bits of green and 2 bits
//! of blue. Pixels are emitted in the strip's serpentine wiring order and the
//! frame ends with [`END_FRAME`], a value no pixel byte may take.

/// Terminates every frame on the wire.
pub const END_FRAME: u8 = 255;

const BYTES_PER_PIXEL: usize = 4;

/// Encodes snapshots of a fixed `width` x `height` surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameEncoder {
    width: usize,
    height: usize,
}

impl FrameEncoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
        }
    }

    /// Total bytes per frame, terminator included.
    pub fn frame_len(&self) -> usize {
        self.width * self.height + 1
    }

    /// Row-major pixel index to read for the `n`th LED along the strip.
    pub fn scan_index(&self, n: usize) -> usize {
        let row = n / self.width;
        let col = n % self.width;
        if row & 1 == 1 {
            row * self.width + (self.width - 1 - col)
        } else {
            n
        }
    }

    /// Encode an RGBA buffer. Missing pixels in a short buffer encode as black
    /// so the frame length never changes.
    pub fn encode(&self, pixels: &[u8]) -> Vec<u8> {
        let count = self.width * self.height;
        let mut frame = Vec::with_capacity(count + 1);
        for n in 0..count {
            let offset = self.scan_index(n) * BYTES_PER_PIXEL;
            let byte = match pixels.get(offset..offset + 3) {
                Some(rgb) => quantize(rgb[0], rgb[1], rgb[2]),
                None => 0,
            };
            frame.push(byte);
        }
        frame.push(END_FRAME);
        frame
    }
}

/// 3-3-2 quantization before the terminator collision check.
pub fn rgb_to_byte(r: u8, g: u8, b: u8) -> u8 {
    ((r >> 5) << 5) | ((g >> 5) << 2) | (b >> 6)
}

/// Quantized pixel byte, never equal to [`END_FRAME`].
pub fn quantize(r: u8, g: u8, b: u8) -> u8 {
    match rgb_to_byte(r, g, b) {
        END_FRAME => END_FRAME - 1,
        byte => byte,
    }
}
