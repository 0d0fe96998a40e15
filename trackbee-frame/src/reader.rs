use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    Assembler,
    Frame,
    Framing,
    FramingError,
};

const READ_BUFFER_SIZE: usize = 2048;

#[derive(Debug, thiserror::Error)]
#[error("frame read error")]
pub enum ReadError {
    Io(#[from] std::io::Error),
    Framing(#[from] FramingError),
}

pin_project! {
    /// Async frame source over a stream transport.
    ///
    /// Yields one item per complete frame. Framing errors are yielded as
    /// `Err` items and the stream remains pollable — a corrupt frame must
    /// not take down the connection. I/O errors are terminal for the
    /// caller to handle.
    #[derive(Debug)]
    pub struct FrameReader<R> {
        #[pin]
        reader: R,
        assembler: Assembler,
        read_buffer: [u8; READ_BUFFER_SIZE],
    }
}

impl<R> FrameReader<R> {
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            reader,
            assembler: Assembler::new(framing),
            read_buffer: [0; READ_BUFFER_SIZE],
        }
    }
}

impl<R: AsyncRead> Stream for FrameReader<R> {
    type Item = Result<Frame, ReadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            match this.assembler.next_frame() {
                Ok(Some(frame)) => return Poll::Ready(Some(Ok(frame))),
                Ok(None) => {}
                Err(error) => return Poll::Ready(Some(Err(error.into()))),
            }

            let mut read_buf = ReadBuf::new(this.read_buffer);
            match this.reader.poll_read(cx, &mut read_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                Poll::Ready(Ok(())) => {
                    let num_bytes_read = read_buf.filled().len();

                    // if no data was received, the underlying reader reached EOF
                    if num_bytes_read == 0 {
                        return Poll::Ready(None);
                    }

                    this.assembler.push(read_buf.filled());
                }
            }
        }
    }
}
