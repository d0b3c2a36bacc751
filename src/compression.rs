//! Compression dispatcher for whole-stream artifacts
//!
//! The dispatcher turns a stream into a `(codec tag, text payload)` pair. It
//! races a priority-ordered list of [`Codec`] strategies, base-85 encodes each
//! result and keeps the smallest; the uncompressed stream competes last as
//! [`CodecTag::Raw`].
//!
//! ## Strategies
//!
//! The default race, in priority order:
//!
//! - **xz**: LZMA2 at preset 9 with the extreme flag
//! - **bz2**: Burrows-Wheeler at the best level
//! - **zlib**: DEFLATE at the best level
//!
//! Streams shorter than the race threshold skip the race and go straight to
//! LZ4, which is fast enough that trying anything else costs more than it
//! saves. A strategy that fails is logged and dropped from the race; if
//! nothing succeeds the stream is stored raw.
//!
//! ## Decoding
//!
//! Decoding looks the tag up among all built-in codecs, whatever strategy list
//! produced the artifact. An unknown tag is an error: without the codec there
//! is nothing to recover.
//!
//! ## Examples
//!
//! ```rust
//! use foldsnap::compression::CompressionDispatcher;
//!
//! let dispatcher = CompressionDispatcher::default();
//! let stream = "--- entry ---\n".repeat(200);
//!
//! let (compressed, stats) = dispatcher.compress(stream.as_bytes())?;
//! assert!(compressed.payload.len() < stream.len());
//! assert_eq!(stats.winner, compressed.tag);
//!
//! let restored = CompressionDispatcher::decompress(compressed.tag.as_str(), &compressed.payload)?;
//! assert_eq!(restored, stream.as_bytes());
//! # Ok::<(), foldsnap::SnapshotError>(())
//! ```

use crate::base85;
use crate::error::{Result, SnapshotError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Default stream size below which the race is skipped
pub const DEFAULT_RACE_THRESHOLD: usize = 1024;

/// `LZMA_PRESET_EXTREME` from liblzma
const XZ_PRESET_EXTREME: u32 = 0x8000_0000;

/// Identifier written in front of a compressed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecTag {
    /// Stream stored as-is
    #[default]
    Raw,
    /// LZ4 block with prepended size
    Lz4,
    /// XZ container (LZMA2)
    Xz,
    /// bzip2
    Bz2,
    /// zlib-wrapped DEFLATE
    Zlib,
}

impl CodecTag {
    /// Every tag this version can decode
    pub const ALL: [CodecTag; 5] = [
        CodecTag::Raw,
        CodecTag::Lz4,
        CodecTag::Xz,
        CodecTag::Bz2,
        CodecTag::Zlib,
    ];

    /// Tag as written in the artifact
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecTag::Raw => "raw",
            CodecTag::Lz4 => "lz4",
            CodecTag::Xz => "xz",
            CodecTag::Bz2 => "bz2",
            CodecTag::Zlib => "zlib",
        }
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecTag {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self> {
        CodecTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| SnapshotError::UnsupportedCodec(s.to_string()))
    }
}

/// A reversible byte transform
pub trait Codec: fmt::Debug + Send + Sync {
    /// Tag identifying this codec in artifacts
    fn tag(&self) -> CodecTag;

    /// Compress a complete buffer
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a complete buffer
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress as much of a damaged or truncated buffer as possible
    ///
    /// Codecs that cannot produce output incrementally fall back to
    /// [`Codec::decompress`].
    fn decompress_partial(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decompress(data)
    }
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Raw
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 block compression, the fast path for small streams
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn tag(&self) -> CodecTag {
        CodecTag::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        decompress_size_prepended(data)
            .map_err(|e| SnapshotError::decompression(format!("LZ4 decompression failed: {}", e)))
    }
}

/// XZ at the strongest preset
#[derive(Debug, Clone, Copy)]
pub struct XzCodec {
    /// Preset level, 0-9
    pub level: u32,
    /// Add the extreme flag to the preset
    pub extreme: bool,
}

impl Default for XzCodec {
    fn default() -> Self {
        Self {
            level: 9,
            extreme: true,
        }
    }
}

impl Codec for XzCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Xz
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let preset = if self.extreme {
            self.level | XZ_PRESET_EXTREME
        } else {
            self.level
        };
        let stream = xz2::stream::Stream::new_easy_encoder(preset, xz2::stream::Check::Crc64)
            .map_err(|e| SnapshotError::compression(format!("xz encoder setup failed: {}", e)))?;
        let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
        encoder
            .write_all(data)
            .map_err(|e| SnapshotError::compression(format!("xz failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| SnapshotError::compression(format!("xz failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_all(xz2::read::XzDecoder::new(data), "xz")
    }

    fn decompress_partial(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_partial(xz2::read::XzDecoder::new(data), "xz")
    }
}

/// bzip2 at the best level
#[derive(Debug, Clone, Copy, Default)]
pub struct Bz2Codec;

impl Codec for Bz2Codec {
    fn tag(&self) -> CodecTag {
        CodecTag::Bz2
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        encoder
            .write_all(data)
            .map_err(|e| SnapshotError::compression(format!("bzip2 failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| SnapshotError::compression(format!("bzip2 failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_all(bzip2::read::BzDecoder::new(data), "bzip2")
    }

    fn decompress_partial(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_partial(bzip2::read::BzDecoder::new(data), "bzip2")
    }
}

/// zlib at the best level
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Zlib
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder
            .write_all(data)
            .map_err(|e| SnapshotError::compression(format!("zlib failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| SnapshotError::compression(format!("zlib failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_all(flate2::read::ZlibDecoder::new(data), "zlib")
    }

    fn decompress_partial(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_partial(flate2::read::ZlibDecoder::new(data), "zlib")
    }
}

fn read_all<R: Read>(mut reader: R, name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|e| SnapshotError::decompression(format!("{} decompression failed: {}", name, e)))?;
    Ok(out)
}

fn read_partial<R: Read>(mut reader: R, name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if let Err(e) = reader.read_to_end(&mut out) {
        if out.is_empty() {
            return Err(SnapshotError::decompression(format!(
                "{} decompression failed: {}",
                name, e
            )));
        }
        debug!("{} stopped after {} bytes: {}", name, out.len(), e);
    }
    Ok(out)
}

/// Built-in codec for a tag
pub fn codec_for(tag: CodecTag) -> Box<dyn Codec> {
    match tag {
        CodecTag::Raw => Box::new(RawCodec),
        CodecTag::Lz4 => Box::new(Lz4Codec),
        CodecTag::Xz => Box::new(XzCodec::default()),
        CodecTag::Bz2 => Box::new(Bz2Codec),
        CodecTag::Zlib => Box::new(ZlibCodec),
    }
}

/// Default race: xz, bz2, zlib
pub fn default_strategies() -> Vec<Box<dyn Codec>> {
    vec![
        Box::new(XzCodec::default()),
        Box::new(Bz2Codec),
        Box::new(ZlibCodec),
    ]
}

/// A stream after the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    /// Codec that produced the payload
    pub tag: CodecTag,
    /// Text-safe payload; base-85 unless the tag is raw
    pub payload: String,
}

impl CompressedPayload {
    /// `<tag>:<payload>` as written after the artifact header
    pub fn to_container(&self) -> String {
        format!("{}:{}", self.tag, self.payload)
    }
}

/// Outcome of one candidate in the race
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResult {
    /// Codec tried
    pub tag: CodecTag,
    /// Encoded payload size, if the codec succeeded
    pub encoded_size: Option<usize>,
    /// Failure text, if it did not
    pub error: Option<String>,
}

/// What the dispatcher did for one stream
#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    /// Every candidate tried, in priority order, raw last
    pub candidates: Vec<CandidateResult>,
    /// Codec that won
    pub winner: CodecTag,
    /// Stream size
    pub input_bytes: usize,
    /// Winning payload size
    pub output_bytes: usize,
    /// Whether the full race ran (false for the small-input fast path)
    pub raced: bool,
    /// Time spent compressing in milliseconds
    pub elapsed_ms: u64,
}

impl CompressionStats {
    /// Output size relative to input (1.0 = no gain)
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            return 1.0;
        }
        self.output_bytes as f64 / self.input_bytes as f64
    }

    /// Encoded size a codec achieved, if it was tried and succeeded
    pub fn size_for(&self, tag: CodecTag) -> Option<usize> {
        self.candidates
            .iter()
            .find(|c| c.tag == tag)
            .and_then(|c| c.encoded_size)
    }
}

/// Races compression strategies over a whole stream
#[derive(Debug)]
pub struct CompressionDispatcher {
    strategies: Vec<Box<dyn Codec>>,
    race_threshold: usize,
}

impl Default for CompressionDispatcher {
    fn default() -> Self {
        Self::new(default_strategies(), DEFAULT_RACE_THRESHOLD)
    }
}

impl CompressionDispatcher {
    /// Create a dispatcher over a priority-ordered strategy list
    ///
    /// # Arguments
    ///
    /// * `strategies` - Codecs to race; earlier entries win ties
    /// * `race_threshold` - Inputs shorter than this use LZ4 without racing
    pub fn new(strategies: Vec<Box<dyn Codec>>, race_threshold: usize) -> Self {
        Self {
            strategies,
            race_threshold,
        }
    }

    /// Default strategies with a custom threshold
    pub fn with_threshold(race_threshold: usize) -> Self {
        Self::new(default_strategies(), race_threshold)
    }

    /// Tags of the configured strategies, in priority order
    pub fn strategy_tags(&self) -> Vec<CodecTag> {
        self.strategies.iter().map(|s| s.tag()).collect()
    }

    /// Compress a stream, choosing the smallest text payload
    ///
    /// # Errors
    ///
    /// Fails only when every codec fails and the stream is not valid UTF-8,
    /// so it cannot be stored raw either.
    pub fn compress(&self, data: &[u8]) -> Result<(CompressedPayload, CompressionStats)> {
        let start = Instant::now();
        let mut stats = CompressionStats {
            input_bytes: data.len(),
            ..Default::default()
        };
        let mut best: Option<CompressedPayload> = None;

        if data.len() < self.race_threshold {
            trace!("{} bytes is under the race threshold, using lz4", data.len());
            consider(&Lz4Codec, data, &mut best, &mut stats);
        } else {
            stats.raced = true;
            for codec in &self.strategies {
                consider(codec.as_ref(), data, &mut best, &mut stats);
            }
        }

        // Raw competes last, so it only wins when strictly smaller
        match std::str::from_utf8(data) {
            Ok(text) => {
                stats.candidates.push(CandidateResult {
                    tag: CodecTag::Raw,
                    encoded_size: Some(text.len()),
                    error: None,
                });
                if best.as_ref().map_or(true, |b| text.len() < b.payload.len()) {
                    best = Some(CompressedPayload {
                        tag: CodecTag::Raw,
                        payload: text.to_string(),
                    });
                }
            }
            Err(e) => {
                stats.candidates.push(CandidateResult {
                    tag: CodecTag::Raw,
                    encoded_size: None,
                    error: Some(format!("stream is not UTF-8: {}", e)),
                });
            }
        }

        let best = best.ok_or_else(|| {
            SnapshotError::compression("every codec failed and the stream cannot be stored raw")
        })?;

        stats.winner = best.tag;
        stats.output_bytes = best.payload.len();
        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Compressed stream {} -> {} bytes with {} ({:.1}%)",
            stats.input_bytes,
            stats.output_bytes,
            stats.winner,
            stats.ratio() * 100.0
        );
        Ok((best, stats))
    }

    /// Invert a payload produced by any built-in codec
    pub fn decompress(tag: &str, payload: &str) -> Result<Vec<u8>> {
        let tag: CodecTag = tag.parse()?;
        if tag == CodecTag::Raw {
            return Ok(payload.as_bytes().to_vec());
        }
        let bytes = base85::decode(payload)?;
        codec_for(tag).decompress(&bytes)
    }

    /// Recover as much of a damaged payload as possible
    ///
    /// Returns the recovered bytes and, when anything was lost, a description
    /// of the damage. An unknown tag is still an error.
    pub fn decompress_lenient(tag: &str, payload: &str) -> Result<(Vec<u8>, Option<String>)> {
        let tag: CodecTag = tag.parse()?;
        if tag == CodecTag::Raw {
            return Ok((payload.as_bytes().to_vec(), None));
        }

        let codec = codec_for(tag);
        let (bytes, b85_problem) = base85::decode_lenient(payload);
        if b85_problem.is_none() {
            if let Ok(out) = codec.decompress(&bytes) {
                return Ok((out, None));
            }
        }

        let out = codec.decompress_partial(&bytes)?;
        let problem = b85_problem.unwrap_or_else(|| format!("{} payload is incomplete", tag));
        warn!("Recovered {} bytes from damaged {} payload: {}", out.len(), tag, problem);
        Ok((out, Some(problem)))
    }
}

fn consider(
    codec: &dyn Codec,
    data: &[u8],
    best: &mut Option<CompressedPayload>,
    stats: &mut CompressionStats,
) {
    let tag = codec.tag();
    match codec.compress(data) {
        Ok(bytes) => {
            let payload = base85::encode(&bytes);
            trace!("{} produced {} payload bytes", tag, payload.len());
            stats.candidates.push(CandidateResult {
                tag,
                encoded_size: Some(payload.len()),
                error: None,
            });
            if best.as_ref().map_or(true, |b| payload.len() < b.payload.len()) {
                *best = Some(CompressedPayload { tag, payload });
            }
        }
        Err(e) => {
            warn!("Codec {} failed, skipping: {}", tag, e);
            stats.candidates.push(CandidateResult {
                tag,
                encoded_size: None,
                error: Some(e.to_string()),
            });
        }
    }
}
