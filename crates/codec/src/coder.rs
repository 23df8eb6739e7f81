//! Reference frame coder.
//!
//! A small lossy block coder used to drive the control plane end to end.
//! Key frames carry quantized DPCM residuals; inter frames carry one motion
//! vector per block plus the quantized residual against the motion
//! compensated reconstruction. Residual levels are zero-run compressed.
//!
//! Frame layout:
//!
//! ```text
//! magic "RTV1" | type u8 | quality u8 | width u32 | height u32 | frame u64 | weights [u8; 16]
//! [inter only: (dx i8, dy i8) per block, raster order]
//! level tokens: 0x00 run(u8)  |  zigzag(level) as LEB128 (first byte != 0)
//! ```

use rtv_common::{
    CodeRequest, CodecError, CodecResult, CodedFrame, FrameCoder, FrameNumber, MotionField, Plane,
    PlaneRef, Resolution,
};
use tracing::{debug, trace};

const MAGIC: &[u8; 4] = b"RTV1";
const HEADER_LEN: usize = 38;
const KEY: u8 = 0;
const INTER: u8 = 1;
/// Neutral quantizer weight.
pub(crate) const UNITY_WEIGHT: i32 = 16;
/// Entries in a quantizer weighting table (one per position in a 4x4 tile).
pub(crate) const QTABLE_LEN: usize = 16;
/// Largest level magnitude the decoder accepts; coded levels never exceed 255.
const MAX_LEVEL: u32 = 255 * 255;

/// Quantizer weights as carried in the frame header. Anything other than 16
/// entries falls back to unity weighting.
fn weights(qtable: &[i32]) -> [u8; QTABLE_LEN] {
    let mut out = [UNITY_WEIGHT as u8; QTABLE_LEN];
    if qtable.len() == QTABLE_LEN {
        for (w, &q) in out.iter_mut().zip(qtable) {
            *w = q.clamp(1, u8::MAX as i32) as u8;
        }
    }
    out
}

/// Quantizer step at `(x, y)` for quantizer index `quality`.
fn step_at(quality: u8, weights: &[u8; 16], x: u32, y: u32) -> i32 {
    let weight = weights[((y % 4) * 4 + x % 4) as usize] as i32;
    ((quality as i32 * weight) / UNITY_WEIGHT).max(1)
}

fn quantize(residual: i32, step: i32) -> i32 {
    if residual >= 0 {
        (residual + step / 2) / step
    } else {
        -((-residual + step / 2) / step)
    }
}

fn clamp_sample(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// DPCM predictor for key frames: left neighbour, else above, else mid-grey.
fn intra_prediction(recon: &[u8], width: usize, x: usize, y: usize) -> i32 {
    if x > 0 {
        recon[y * width + x - 1] as i32
    } else if y > 0 {
        recon[(y - 1) * width] as i32
    } else {
        128
    }
}

// ---------------------------------------------------------------------------
// Level token stream
// ---------------------------------------------------------------------------

struct LevelWriter {
    out: Vec<u8>,
    zeros: u32,
}

impl LevelWriter {
    fn new(out: Vec<u8>) -> Self {
        Self { out, zeros: 0 }
    }

    fn push(&mut self, level: i32) {
        if level == 0 {
            self.zeros += 1;
            if self.zeros == u8::MAX as u32 {
                self.flush_zeros();
            }
            return;
        }
        self.flush_zeros();
        let mut z = ((level << 1) ^ (level >> 31)) as u32;
        loop {
            let byte = (z & 0x7f) as u8;
            z >>= 7;
            if z == 0 {
                self.out.push(byte);
                break;
            }
            self.out.push(byte | 0x80);
        }
    }

    fn flush_zeros(&mut self) {
        if self.zeros > 0 {
            self.out.push(0);
            self.out.push(self.zeros as u8);
            self.zeros = 0;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.flush_zeros();
        self.out
    }
}

struct LevelReader<'a> {
    data: &'a [u8],
    pos: usize,
    zeros: u32,
}

impl<'a> LevelReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            zeros: 0,
        }
    }

    fn byte(&mut self) -> CodecResult<u8> {
        let b = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| CodecError::DecodeFailed("truncated level stream".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn next(&mut self) -> CodecResult<i32> {
        if self.zeros > 0 {
            self.zeros -= 1;
            return Ok(0);
        }
        let first = self.byte()?;
        if first == 0 {
            let run = self.byte()?;
            if run == 0 {
                return Err(CodecError::DecodeFailed("empty zero run".to_string()));
            }
            self.zeros = run as u32 - 1;
            return Ok(0);
        }
        let mut z = (first & 0x7f) as u32;
        let mut shift = 7;
        let mut byte = first;
        while byte & 0x80 != 0 {
            if shift > 28 {
                return Err(CodecError::DecodeFailed("level overflow".to_string()));
            }
            byte = self.byte()?;
            z |= ((byte & 0x7f) as u32) << shift;
            shift += 7;
        }
        if z >> 1 > MAX_LEVEL {
            return Err(CodecError::DecodeFailed(format!("level {} out of range", z >> 1)));
        }
        Ok(((z >> 1) as i32) ^ -((z & 1) as i32))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

struct Header {
    kind: u8,
    quality: u8,
    resolution: Resolution,
    frame_number: FrameNumber,
    weights: [u8; 16],
}

impl Header {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        out.push(self.kind);
        out.push(self.quality);
        out.extend_from_slice(&self.resolution.width.to_le_bytes());
        out.extend_from_slice(&self.resolution.height.to_le_bytes());
        out.extend_from_slice(&self.frame_number.0.to_le_bytes());
        out.extend_from_slice(&self.weights);
    }

    fn read(data: &[u8]) -> CodecResult<Self> {
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return Err(CodecError::DecodeFailed("missing frame header".to_string()));
        }
        let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let mut frame = [0u8; 8];
        frame.copy_from_slice(&data[14..22]);
        let mut weights = [0u8; 16];
        weights.copy_from_slice(&data[22..38]);
        if weights.contains(&0) {
            return Err(CodecError::DecodeFailed("zero quantizer weight".to_string()));
        }
        Ok(Self {
            kind: data[4],
            quality: data[5],
            resolution: Resolution::new(u32_at(6), u32_at(10)),
            frame_number: FrameNumber(u64::from_le_bytes(frame)),
            weights,
        })
    }
}

// ---------------------------------------------------------------------------
// ReferenceCoder
// ---------------------------------------------------------------------------

/// Lossy reference implementation of [`FrameCoder`].
///
/// The encoder keeps its own reconstruction as the prediction reference;
/// the decoder keeps a separate one so a stream can be decoded by the same
/// instance that produced it.
#[derive(Debug, Default)]
pub struct ReferenceCoder {
    resolution: Option<Resolution>,
    block_size: u32,
    reconstruction: Option<Plane>,
    decoded: Option<Plane>,
}

impl ReferenceCoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn geometry(&self) -> CodecResult<Resolution> {
        self.resolution.ok_or(CodecError::NotOpen)
    }

    /// Code one frame at `quality`, returning the bytes and the reconstruction.
    fn code_at(
        &self,
        request: &CodeRequest<'_>,
        vectors: Option<&[(i8, i8)]>,
        quality: u8,
    ) -> CodecResult<(Vec<u8>, Plane)> {
        let res = request.source.resolution();
        let width = res.width as usize;
        let weights = weights(request.qtable);
        let mut out = Vec::with_capacity(HEADER_LEN + width);
        Header {
            kind: if vectors.is_some() { INTER } else { KEY },
            quality,
            resolution: res,
            frame_number: request.frame_number,
            weights,
        }
        .write(&mut out);

        if let Some(vectors) = vectors {
            for &(dx, dy) in vectors {
                out.push(dx as u8);
                out.push(dy as u8);
            }
        }

        let mut recon = Plane::new(res);
        let mut levels = LevelWriter::new(out);
        let src = request.source.data();
        let reference = self.reconstruction.as_ref().map(Plane::view);
        let (columns, _) = res.block_grid(self.block_size);

        for y in 0..res.height {
            for x in 0..res.width {
                let i = y as usize * width + x as usize;
                let prediction = match (vectors, reference) {
                    (Some(vectors), Some(reference)) => {
                        let block = (y / self.block_size) * columns + x / self.block_size;
                        let (dx, dy) = vectors[block as usize];
                        reference.sample_clamped(x as i32 + dx as i32, y as i32 + dy as i32) as i32
                    }
                    _ => intra_prediction(recon.data(), width, x as usize, y as usize),
                };
                let step = step_at(quality, &weights, x, y);
                let level = quantize(src[i] as i32 - prediction, step);
                levels.push(level);
                recon.data_mut()[i] = clamp_sample(prediction + level * step);
            }
        }

        Ok((levels.finish(), recon))
    }

    fn vectors(field: &MotionField, frame: FrameNumber) -> CodecResult<Vec<(i8, i8)>> {
        field
            .vectors
            .iter()
            .map(|v| match (i8::try_from(v.dx), i8::try_from(v.dy)) {
                (Ok(dx), Ok(dy)) => Ok((dx, dy)),
                _ => Err(CodecError::CodeFailed {
                    frame: frame.0,
                    reason: format!("motion vector ({}, {}) out of range", v.dx, v.dy),
                }),
            })
            .collect()
    }
}

impl FrameCoder for ReferenceCoder {
    fn name(&self) -> &str {
        "reference"
    }

    fn open(&mut self, resolution: Resolution, block_size: u32) -> CodecResult<()> {
        if block_size == 0 {
            return Err(CodecError::InvalidConfig("block size must be > 0".to_string()));
        }
        self.resolution = Some(resolution);
        self.block_size = block_size;
        self.reconstruction = None;
        self.decoded = None;
        Ok(())
    }

    fn code(&mut self, request: &CodeRequest<'_>) -> CodecResult<CodedFrame> {
        let res = self.geometry()?;
        if request.source.resolution() != res {
            return Err(CodecError::FrameGeometry {
                expected: res,
                got: request.source.resolution(),
            });
        }

        let vectors = if request.keyframe {
            None
        } else {
            if self.reconstruction.is_none() {
                return Err(CodecError::CodeFailed {
                    frame: request.frame_number.0,
                    reason: "inter frame requested without a reference".to_string(),
                });
            }
            let (columns, rows) = res.block_grid(self.block_size);
            let vectors = match request.motion {
                Some(m) if m.field.len() == (columns * rows) as usize => {
                    Self::vectors(&m.field, request.frame_number)?
                }
                Some(m) => {
                    return Err(CodecError::CodeFailed {
                        frame: request.frame_number.0,
                        reason: format!(
                            "motion field has {} vectors, expected {}",
                            m.field.len(),
                            columns * rows
                        ),
                    })
                }
                None => vec![(0, 0); (columns * rows) as usize],
            };
            Some(vectors)
        };

        // Chase the advisory budget by coarsening; keep the last attempt if it is never met.
        let mut quality = request.quality.max(1);
        let max_quality = request.max_quality.max(quality);
        let (data, recon) = loop {
            let (data, recon) = self.code_at(request, vectors.as_deref(), quality)?;
            let bits = data.len() as u64 * 8;
            match request.frame_bit_limit {
                Some(limit) if bits > limit as u64 && quality < max_quality => {
                    trace!(bits, limit, quality, "Frame over budget, coarsening");
                    quality = (quality + (quality / 4).max(1)).min(max_quality);
                }
                _ => break (data, recon),
            }
        };

        self.reconstruction = Some(recon);

        let bit_length = data.len() as u64 * 8;
        debug!(
            frame = %request.frame_number,
            keyframe = request.keyframe,
            quality,
            bits = bit_length,
            "Reference coder produced frame"
        );

        Ok(CodedFrame {
            frame_number: request.frame_number,
            data,
            bit_length,
            keyframe: request.keyframe,
            quality,
            group_id: 0,
        })
    }

    fn decode(&mut self, data: &[u8]) -> CodecResult<Plane> {
        let res = self.geometry()?;
        let header = Header::read(data)?;
        if header.resolution != res {
            return Err(CodecError::FrameGeometry {
                expected: res,
                got: header.resolution,
            });
        }
        let width = res.width as usize;
        let (columns, rows) = res.block_grid(self.block_size);
        let mut body = &data[HEADER_LEN..];

        let vectors = match header.kind {
            KEY => None,
            INTER => {
                if self.decoded.is_none() {
                    return Err(CodecError::DecodeFailed(
                        "inter frame without a decoded reference".to_string(),
                    ));
                }
                let count = (columns * rows) as usize;
                if body.len() < count * 2 {
                    return Err(CodecError::DecodeFailed("truncated motion vectors".to_string()));
                }
                let vectors: Vec<(i8, i8)> = body[..count * 2]
                    .chunks_exact(2)
                    .map(|p| (p[0] as i8, p[1] as i8))
                    .collect();
                body = &body[count * 2..];
                Some(vectors)
            }
            other => {
                return Err(CodecError::DecodeFailed(format!("unknown frame type {other}")));
            }
        };

        let mut out = Plane::new(res);
        let mut levels = LevelReader::new(body);
        let reference = self.decoded.as_ref().map(Plane::view);

        for y in 0..res.height {
            for x in 0..res.width {
                let i = y as usize * width + x as usize;
                let prediction = match (&vectors, reference) {
                    (Some(vectors), Some(reference)) => {
                        let block = (y / self.block_size) * columns + x / self.block_size;
                        let (dx, dy) = vectors[block as usize];
                        reference.sample_clamped(x as i32 + dx as i32, y as i32 + dy as i32) as i32
                    }
                    _ => intra_prediction(out.data(), width, x as usize, y as usize),
                };
                let step = step_at(header.quality, &header.weights, x, y);
                let level = levels.next()?;
                out.data_mut()[i] = clamp_sample(prediction + level * step);
            }
        }

        trace!(frame = %header.frame_number, keyframe = header.kind == KEY, "Decoded frame");
        self.decoded = Some(out.clone());
        Ok(out)
    }

    fn reference(&self) -> Option<PlaneRef<'_>> {
        self.reconstruction.as_ref().map(Plane::view)
    }

    fn restart(&mut self) {
        self.reconstruction = None;
        self.decoded = None;
    }

    fn close(&mut self) {
        self.resolution = None;
        self.reconstruction = None;
        self.decoded = None;
    }
}
