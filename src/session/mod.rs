mod machine;
mod negotiate;
mod prompt;

use crate::config::ConnectOptions;
use crate::error::{TelnetError, TelnetResult};
use bytes::BytesMut;
use machine::{Action, Machine};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// Notifications a session delivers to its embedder, in emission order.
/// `Ready` is emitted exactly once per connection; `Timeout` is an advisory
/// quiet-transport notification and changes no state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready { prompt: String },
    CommandResult { lines: Vec<String> },
    Timeout,
    Error { detail: String },
    End,
    Closed,
}

enum IoMsg {
    Chunk(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

enum Control {
    Exec {
        command: String,
        reply: oneshot::Sender<TelnetResult<Vec<String>>>,
    },
    Shutdown,
}

/// Handle to a running Telnet session. The session itself is an actor task
/// owning all protocol state; transport chunks and commands are processed
/// one at a time, so command submission and chunk classification can never
/// interleave.
pub struct Telnet {
    control: mpsc::Sender<Control>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    id: String,
}

impl Telnet {
    /// Opens a TCP connection bounded by `timeout_ms` and starts the session.
    pub async fn connect(options: ConnectOptions) -> TelnetResult<Self> {
        let addr = format!("{}:{}", options.host, options.port);
        let stream = timeout(
            Duration::from_millis(options.timeout_ms),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| TelnetError::ConnectTimeout)?
        .map_err(TelnetError::ConnectFailed)?;
        Self::from_stream(stream, options)
    }

    /// Starts a session over an already established byte stream.
    pub fn from_stream<S>(stream: S, options: ConnectOptions) -> TelnetResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let machine = Machine::new(&options)?;
        let id = Uuid::new_v4().to_string();
        let (reader, writer) = tokio::io::split(stream);
        let (io_tx, io_rx) = mpsc::channel(32);
        let (control_tx, control_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(reader, io_tx));
        let actor = SessionActor {
            id: id.clone(),
            machine,
            writer,
            io_rx,
            control_rx,
            events: event_tx,
            pending: None,
            quiet_after: Duration::from_millis(options.timeout_ms),
            reader_task,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            control: control_tx,
            events: event_rx,
            id,
        })
    }

    /// Sends a command line and collects its output until the shell prompt
    /// reappears. Fails immediately with [`TelnetError::Busy`] unless the
    /// session is at an idle prompt.
    pub async fn exec(&self, command: &str) -> TelnetResult<Vec<String>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Control::Exec {
                command: command.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| TelnetError::Closed)?;
        reply_rx.await.map_err(|_| TelnetError::Closed)?
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Drains events until the first shell prompt is detected, returning the
    /// detected prompt text.
    pub async fn ready(&mut self) -> TelnetResult<String> {
        loop {
            match self.events.recv().await {
                Some(SessionEvent::Ready { prompt }) => return Ok(prompt),
                Some(SessionEvent::Error { detail }) => return Err(TelnetError::Transport(detail)),
                Some(SessionEvent::Closed) | None => return Err(TelnetError::Closed),
                Some(_) => {}
            }
        }
    }

    /// Tears the session down. Any in-flight command fails with
    /// [`TelnetError::Closed`]; a `Closed` event is emitted. Dropping the
    /// handle has the same effect.
    pub async fn close(&self) {
        let _ = self.control.send(Control::Shutdown).await;
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

async fn read_loop<R>(mut reader: R, io_tx: mpsc::Sender<IoMsg>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                let _ = io_tx.send(IoMsg::Eof).await;
                break;
            }
            Ok(_) => {
                if io_tx.send(IoMsg::Chunk(buf.to_vec())).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = io_tx.send(IoMsg::Failed(err)).await;
                break;
            }
        }
    }
}

struct SessionActor<W> {
    id: String,
    machine: Machine,
    writer: W,
    io_rx: mpsc::Receiver<IoMsg>,
    control_rx: mpsc::Receiver<Control>,
    events: mpsc::UnboundedSender<SessionEvent>,
    pending: Option<oneshot::Sender<TelnetResult<Vec<String>>>>,
    quiet_after: Duration,
    reader_task: tokio::task::JoinHandle<()>,
}

impl<W: AsyncWrite + Unpin> SessionActor<W> {
    async fn run(mut self) {
        let mut quiet_armed = true;
        loop {
            let quiet = sleep(self.quiet_after);
            tokio::pin!(quiet);
            tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(Control::Exec { command, reply }) => {
                        match self.machine.begin_exec(&command) {
                            Ok(action) => {
                                self.pending = Some(reply);
                                if !self.run_actions(vec![action]).await {
                                    break;
                                }
                            }
                            Err(err) => {
                                let _ = reply.send(Err(err));
                            }
                        }
                    }
                    Some(Control::Shutdown) | None => {
                        self.shutdown(None).await;
                        break;
                    }
                },
                io = self.io_rx.recv() => match io {
                    Some(IoMsg::Chunk(chunk)) => {
                        quiet_armed = true;
                        let actions = self.machine.on_chunk(&chunk);
                        if !self.run_actions(actions).await {
                            break;
                        }
                    }
                    Some(IoMsg::Eof) | None => {
                        self.emit(SessionEvent::End);
                        self.shutdown(Some(TelnetError::Closed)).await;
                        break;
                    }
                    Some(IoMsg::Failed(err)) => {
                        tracing::warn!(session_id = %self.id, error = %err, "telnet read failed");
                        self.emit(SessionEvent::Error {
                            detail: err.to_string(),
                        });
                        self.shutdown(Some(TelnetError::Transport(err.to_string()))).await;
                        break;
                    }
                },
                _ = &mut quiet, if quiet_armed => {
                    quiet_armed = false;
                    self.emit(SessionEvent::Timeout);
                }
            }
        }
    }

    /// Executes machine actions in order. Writes are awaited here, and the
    /// transition tied to a write is applied only once it has completed, so
    /// the effects of a command never overlap with classification of the
    /// next chunk. Returns false on a fatal transport failure.
    async fn run_actions(&mut self, actions: Vec<Action>) -> bool {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Write { bytes, done } => {
                    if let Err(err) = self.write_all(&bytes).await {
                        tracing::warn!(session_id = %self.id, error = %err, "telnet write failed");
                        self.emit(SessionEvent::Error {
                            detail: err.to_string(),
                        });
                        self.shutdown(Some(TelnetError::Transport(err.to_string()))).await;
                        return false;
                    }
                    let follow_ups = self.machine.on_write_done(done);
                    for follow_up in follow_ups.into_iter().rev() {
                        queue.push_front(follow_up);
                    }
                }
                Action::Notify(event) => self.emit(event),
                Action::Respond(result) => {
                    if let Some(reply) = self.pending.take() {
                        let _ = reply.send(result);
                    }
                }
            }
        }
        true
    }

    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn shutdown(&mut self, pending_error: Option<TelnetError>) {
        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Err(pending_error.unwrap_or(TelnetError::Closed)));
        }
        self.machine.close();
        let _ = self.writer.shutdown().await;
        self.reader_task.abort();
        self.emit(SessionEvent::Closed);
    }
}
