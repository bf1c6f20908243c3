use adb_stream::{AdbStream, StreamFactory, StreamHandler, Target};
use bytes::{Bytes, BytesMut};
use eyre::{Result, WrapErr};
use tokio::io::{AsyncReadExt, AsyncWriteExt, stdin, stdout};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, info, trace, warn};

const BUF_SIZE: usize = 64 * 1024;

enum Event {
    Data(Bytes),
    Closed,
}

/// Moves stream callbacks onto the pipe loop.
struct Forwarder(UnboundedSender<Event>);

impl StreamHandler for Forwarder {
    fn on_data(&self, data: Bytes) {
        let _ = self.0.send(Event::Data(data));
    }

    fn on_close(&self) {
        let _ = self.0.send(Event::Closed);
    }
}

/// Opens `destination` and pipes stdin to it and its output to stdout until the
/// remote closes the stream or the user interrupts.
pub async fn run(factory: &StreamFactory, destination: &str, target: Option<&Target>) -> Result<()> {
    let (tx, mut events) = unbounded_channel();
    let stream = AdbStream::new(destination, Forwarder(tx));
    factory.open(&stream, target).await.with_context(|| format!("open {destination}"))?;

    let mut input = stdin();
    let mut output = stdout();
    let mut buf = BytesMut::with_capacity(BUF_SIZE);
    let mut input_open = true;

    loop {
        select! {
            event = events.recv() => match event {
                Some(Event::Data(data)) => {
                    output.write_all(&data).await.context("write stdout")?;
                    output.flush().await.context("flush stdout")?;
                }
                Some(Event::Closed) | None => {
                    debug!("closed by remote");
                    break;
                }
            },
            read = input.read_buf(&mut buf), if input_open => {
                if read.context("read stdin")? == 0 {
                    // The stream has no half-close, keep reading until the remote is done
                    trace!("stdin ended");
                    input_open = false;
                } else if let Err(err) = stream.write(buf.split()) {
                    warn!(?err, "write failed");
                    input_open = false;
                }
                buf.reserve(BUF_SIZE);
            },
            _ = ctrl_c() => {
                info!("interrupted");
                stream.close()?;
                break;
            }
        }
    }

    output.flush().await.context("flush stdout")?;
    Ok(())
}
