//! Double-buffered comparison of two byte streams
//!
//! Each side owns a [`BufferSet`] of two equally sized buffers. While the "back" buffers of both
//! sides are compared, the next chunk of each stream is read into the "front" buffers. Once
//! both the comparison and the reads complete the roles are swapped, the buffers themselves
//! never move or get copied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::instrument;

use crate::bufcmp;
use crate::progress;

pub const DEFAULT_CHUNK_SIZE: usize = 32_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Src,
    Dst,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Src => write!(f, "source"),
            Side::Dst => write!(f, "destination"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed reading {side} stream")]
    Read {
        side: Side,
        #[source]
        source: std::io::Error,
    },
    #[error("comparison cancelled")]
    Cancelled,
}

/// Shared flag checked between chunks, once set all running comparisons stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Reads until `buf` is full or the stream ends, returns the number of bytes filled.
///
/// A return value smaller than `buf.len()` means end-of-stream was reached.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Front and back buffer for one side of a comparison.
///
/// The back buffer holds the chunk being compared, the front buffer receives the next chunk.
pub struct BufferSet {
    slots: [Vec<u8>; 2],
    filled: [usize; 2],
    back: usize,
}

impl BufferSet {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = std::cmp::max(1, capacity);
        Self {
            slots: [vec![0; capacity], vec![0; capacity]],
            filled: [0, 0],
            back: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots[0].len()
    }

    /// Valid bytes of the back buffer.
    #[must_use]
    pub fn back(&self) -> &[u8] {
        &self.slots[self.back][..self.filled[self.back]]
    }

    /// A short back buffer means its stream has already reached the end.
    #[must_use]
    pub fn back_is_full(&self) -> bool {
        self.filled[self.back] == self.capacity()
    }

    async fn prime<R>(&mut self, reader: &mut R) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.filled[self.back] = read_chunk(reader, &mut self.slots[self.back]).await?;
        Ok(())
    }

    /// Valid back bytes and the whole front buffer, borrowed at the same time.
    fn split(&mut self) -> (&[u8], &mut [u8]) {
        let back_len = self.filled[self.back];
        let [first, second] = &mut self.slots;
        let (back, front) = if self.back == 0 {
            (first, second)
        } else {
            (second, first)
        };
        (&back[..back_len], front.as_mut_slice())
    }

    /// Makes the freshly filled front buffer the new back buffer.
    fn swap(&mut self, front_filled: usize) {
        let front = 1 - self.back;
        self.filled[front] = front_filled;
        self.back = front;
    }
}

/// Returns true iff both streams yield exactly the same bytes.
///
/// Stops reading at the first differing chunk. Reads already issued for the next chunk are
/// always driven to completion before returning.
#[instrument(skip(src, dst, prog_track, cancel))]
pub async fn compare_streams<A, B>(
    src: &mut A,
    dst: &mut B,
    chunk_size: usize,
    prog_track: &progress::Progress,
    cancel: &CancelFlag,
) -> Result<bool, Error>
where
    A: AsyncRead + Unpin + ?Sized,
    B: AsyncRead + Unpin + ?Sized,
{
    let mut src_bufs = BufferSet::new(chunk_size);
    let mut dst_bufs = BufferSet::new(chunk_size);
    let (src_primed, dst_primed) = tokio::join!(src_bufs.prime(src), dst_bufs.prime(dst));
    src_primed.map_err(|source| Error::Read {
        side: Side::Src,
        source,
    })?;
    dst_primed.map_err(|source| Error::Read {
        side: Side::Dst,
        source,
    })?;
    while src_bufs.back_is_full() && dst_bufs.back_is_full() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (src_back, src_front) = src_bufs.split();
        let (dst_back, dst_front) = dst_bufs.split();
        // reads are polled first so they get dispatched before the comparison runs
        let (src_read, dst_read, same) = tokio::join!(
            read_chunk(src, src_front),
            read_chunk(dst, dst_front),
            async { bufcmp::chunks_equal(src_back, dst_back) },
        );
        prog_track.bytes_compared.add(src_back.len() as u64);
        if !same {
            tracing::debug!("chunks differ");
            return Ok(false);
        }
        let src_filled = src_read.map_err(|source| Error::Read {
            side: Side::Src,
            source,
        })?;
        let dst_filled = dst_read.map_err(|source| Error::Read {
            side: Side::Dst,
            source,
        })?;
        src_bufs.swap(src_filled);
        dst_bufs.swap(dst_filled);
    }
    // tail chunk, at least one of the streams is exhausted
    let same = bufcmp::chunks_equal(src_bufs.back(), dst_bufs.back());
    prog_track
        .bytes_compared
        .add(std::cmp::min(src_bufs.back().len(), dst_bufs.back().len()) as u64);
    Ok(same)
}
