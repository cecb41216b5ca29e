//! Byte-level helpers for textual image headers.
//!
//! Both the PFM and the synthetic `empty` formats start with ASCII tokens
//! separated by whitespace, followed by binary payload. [`HeaderReader`]
//! reads exactly the header bytes and nothing more, so the payload can be
//! read from the same stream afterwards.

use super::error::LoadError;
use crate::image::Vector2i;
use std::io::{self, Read, Seek, SeekFrom};
use std::str::FromStr;

/// Upper bound on the length of a single header token.
const MAX_TOKEN_LEN: usize = 64;

/// Upper bound on the float samples a header may declare, over all channels.
pub(crate) const MAX_SAMPLES: usize = 1 << 30;

/// Number of samples in `channels` planes of `size`.
///
/// Fails for empty sizes and for declarations beyond [`MAX_SAMPLES`], before
/// anything is allocated for them.
pub(crate) fn sample_count(size: Vector2i, channels: usize) -> Result<usize, LoadError> {
    if size.x <= 0 || size.y <= 0 {
        return Err(LoadError::format("image has zero pixels"));
    }

    (size.x as usize)
        .checked_mul(size.y as usize)
        .and_then(|area| area.checked_mul(channels))
        .filter(|&samples| samples <= MAX_SAMPLES)
        .ok_or_else(|| {
            LoadError::format(format!(
                "{} image with {} channels exceeds {} samples",
                size, channels, MAX_SAMPLES
            ))
        })
}

/// Reads up to `n` leading bytes and restores the stream position.
pub(crate) fn peek_prefix<S: Read + Seek + ?Sized>(stream: &mut S, n: usize) -> io::Result<Vec<u8>> {
    let start = stream.stream_position()?;
    let mut prefix = Vec::with_capacity(n);
    let read = Read::take(&mut *stream, n as u64).read_to_end(&mut prefix);
    stream.seek(SeekFrom::Start(start))?;
    read?;
    Ok(prefix)
}

/// Reads whitespace-separated header tokens one byte at a time.
pub(crate) struct HeaderReader<'a, R: Read + ?Sized> {
    stream: &'a mut R,
}

impl<'a, R: Read + ?Sized> HeaderReader<'a, R> {
    pub fn new(stream: &'a mut R) -> Self {
        Self { stream }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, LoadError> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>, LoadError> {
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_whitespace() => continue,
                other => return Ok(other),
            }
        }
    }

    /// Reads the next token. The single whitespace byte ending it is consumed.
    pub fn token(&mut self) -> Result<String, LoadError> {
        let mut token = Vec::new();
        let mut next = self.skip_whitespace()?;

        while let Some(b) = next {
            if b.is_ascii_whitespace() {
                break;
            }
            if token.len() == MAX_TOKEN_LEN {
                return Err(LoadError::format("header token is too long"));
            }
            token.push(b);
            next = self.next_byte()?;
        }

        if token.is_empty() {
            return Err(LoadError::format("unexpected end of header"));
        }
        String::from_utf8(token).map_err(|_| LoadError::format("header is not valid text"))
    }

    /// Reads the next token and parses it.
    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, LoadError> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| LoadError::format(format!("invalid {} '{}'", what, token)))
    }

    /// Reads a decimal length prefix.
    ///
    /// The number ends at the first non-digit byte. If that byte is
    /// whitespace it is consumed as a separator; otherwise it is returned as
    /// the first byte of the data that follows.
    pub fn length_prefix(&mut self) -> Result<(usize, Option<u8>), LoadError> {
        let mut digits = String::new();
        let mut next = self.skip_whitespace()?;

        while let Some(b) = next {
            if !b.is_ascii_digit() {
                break;
            }
            if digits.len() == MAX_TOKEN_LEN {
                return Err(LoadError::format("length prefix is too long"));
            }
            digits.push(b as char);
            next = self.next_byte()?;
        }

        let length = digits
            .parse()
            .map_err(|_| LoadError::format("expected a length prefix"))?;
        let carried = next.filter(|b| !b.is_ascii_whitespace());
        Ok((length, carried))
    }

    /// Reads exactly `n` bytes.
    ///
    /// The buffer grows with the bytes actually read, so a bogus `n` fails
    /// with an unexpected EOF instead of a huge allocation.
    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>, LoadError> {
        let mut buf = Vec::new();
        Read::take(&mut *self.stream, n as u64).read_to_end(&mut buf)?;
        if buf.len() < n {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buf)
    }
}
