use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::{HeaderValue, StatusCode, header};
use micro_dispatch::filter::{Filter, Next};
use micro_dispatch::handler::HandlerResult;
use micro_dispatch::{Request, Response};
use std::io;
use std::io::Write;
use tracing::trace;
use zstd::stream::write::Encoder as ZstdEncoder;

/// Bodies smaller than this are sent as they are.
pub const DEFAULT_MIN_SIZE: usize = 1024;

const ZSTD_LEVEL: i32 = 6;

/// Compresses response bodies with the best coding the client accepts.
///
/// The filter runs the rest of the chain first, then picks the coding with the highest quality
/// in the request's `Accept-Encoding` among `zstd`, `br`, `gzip` and `deflate`, preferring them
/// in that order on equal quality. Empty or small bodies, bodies the handler already encoded and
/// responses without content are left untouched.
#[derive(Debug, Clone, Copy)]
pub struct CompressFilter {
    min_size: usize,
}

impl Default for CompressFilter {
    fn default() -> Self {
        Self { min_size: DEFAULT_MIN_SIZE }
    }
}

impl CompressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    fn should_compress(&self, resp: &Response) -> bool {
        let status = resp.status();
        if status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || status == StatusCode::SWITCHING_PROTOCOLS
        {
            return false;
        }

        // already encoded by the handler
        if resp.headers().contains_key(header::CONTENT_ENCODING) {
            return false;
        }

        let len = resp.body().len();
        len > 0 && len >= self.min_size
    }
}

#[async_trait]
impl Filter for CompressFilter {
    async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
        next.run(req, resp).await?;

        if !self.should_compress(resp) {
            return Ok(());
        }
        let Some(coding) = Coding::negotiate(req.accept_encodings()) else {
            return Ok(());
        };

        let name = coding.token();
        let raw_len = resp.body().len();
        let encoded = Encoder::new(coding)?.encode(resp.body())?;
        trace!(encoding = name, raw_len, encoded_len = encoded.len(), "response body compressed");

        resp.replace_body(&encoded);
        resp.remove_header(header::CONTENT_LENGTH);
        resp.set_content_encoding(name);
        resp.headers_mut().append(header::VARY, HeaderValue::from_static("accept-encoding"));
        Ok(())
    }
}

struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A content coding the filter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coding {
    Zstd,
    Br,
    Gzip,
    Deflate,
}

impl Coding {
    /// Server preference, used to break ties between equal qualities.
    const PREFERRED: [Coding; 4] = [Coding::Zstd, Coding::Br, Coding::Gzip, Coding::Deflate];

    fn token(self) -> &'static str {
        match self {
            Coding::Zstd => "zstd",
            Coding::Br => "br",
            Coding::Gzip => "gzip",
            Coding::Deflate => "deflate",
        }
    }

    /// Picks the accepted coding with the highest quality in an `Accept-Encoding` value.
    ///
    /// `q=0` refuses a coding and `*` stands for every coding not listed by name.
    fn negotiate(accept_encodings: &str) -> Option<Coding> {
        let mut best: Option<(Coding, u16)> = None;
        for coding in Self::PREFERRED {
            let q = quality(accept_encodings, coding.token());
            if q > 0 && best.is_none_or(|(_, best_q)| q > best_q) {
                best = Some((coding, q));
            }
        }
        best.map(|(coding, _)| coding)
    }
}

/// Quality of `token` in thousandths: its own entry if listed, the `*` entry otherwise, else 0.
/// Entries with a malformed `q` are skipped.
fn quality(accept_encodings: &str, token: &str) -> u16 {
    let mut wildcard = 0;
    for entry in accept_encodings.split(',') {
        let mut params = entry.split(';');
        let name = params.next().unwrap_or_default().trim();
        let q = params
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
            .map_or(Some(1000), |(_, value)| parse_qvalue(value.trim()));
        let Some(q) = q else {
            continue;
        };

        if name.eq_ignore_ascii_case(token) {
            return q;
        }
        if name == "*" {
            wildcard = q;
        }
    }
    wildcard
}

/// Parses a `qvalue` (`0`, `0.5`, `1.000`, ...) into thousandths.
fn parse_qvalue(value: &str) -> Option<u16> {
    let (int, frac) = value.split_once('.').unwrap_or((value, ""));
    if frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let thousandths =
        frac.bytes().chain(std::iter::repeat(b'0')).take(3).fold(0_u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    match int {
        "0" => Some(thousandths),
        "1" if thousandths == 0 => Some(1000),
        _ => None,
    }
}

/// A one-shot encoder for a [`Coding`].
enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    fn new(coding: Coding) -> io::Result<Self> {
        let encoder = match coding {
            Coding::Zstd => Self::Zstd(ZstdEncoder::new(Writer::new(), ZSTD_LEVEL)?),
            // 32 KiB buffer, quality 3, window 22
            Coding::Br => Self::Br(Box::new(brotli::CompressorWriter::new(Writer::new(), 32 * 1024, 3, 22))),
            Coding::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), Compression::default())),
            Coding::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default())),
        };
        Ok(encoder)
    }

    fn encode(mut self, data: &[u8]) -> io::Result<Bytes> {
        match &mut self {
            Self::Gzip(encoder) => encoder.write_all(data)?,
            Self::Deflate(encoder) => encoder.write_all(data)?,
            Self::Zstd(encoder) => encoder.write_all(data)?,
            Self::Br(encoder) => encoder.write_all(data)?,
        }
        self.finish()
    }

    fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Gzip(encoder) => Ok(encoder.finish()?.freeze()),
            Self::Deflate(encoder) => Ok(encoder.finish()?.freeze()),
            Self::Zstd(encoder) => Ok(encoder.finish()?.freeze()),
            Self::Br(mut encoder) => {
                encoder.flush()?;
                Ok(encoder.into_inner().freeze())
            }
        }
    }
}
