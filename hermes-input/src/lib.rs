//! Keyboard fan-out (spec §4.5): one thread reads stdin line-by-line and
//! broadcasts each line to every local worker. Shutdown is cooperative: a
//! sentinel posted at `DRAIN` causes subscribers to stop waiting on the
//! channel even though the reader thread itself may still be blocked on
//! stdin — that thread is never joined, per spec §5's "the keyboard reader
//! runs on a dedicated daemon thread", and is simply abandoned at process
//! exit.

use std::io::BufRead;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::{GlobalNodeId, Msg, MsgKind, Nanos};
use hermes_transport::CoordinationClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyboardEvent {
    Line(String),
    /// The sentinel posted once, when the Broker enters `DRAIN`.
    Shutdown,
}

#[derive(Clone)]
pub struct KeyboardHub {
    tx: broadcast::Sender<KeyboardEvent>,
}

impl KeyboardHub {
    /// Starts the stdin reader thread and returns a hub other components
    /// subscribe to. `capacity` bounds how far a slow subscriber may lag.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        let reader_tx = tx.clone();
        std::thread::spawn(move || reader_loop(reader_tx));
        KeyboardHub { tx }
    }

    pub fn subscribe(&self) -> KeyboardSubscription {
        KeyboardSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Post the shutdown sentinel (spec §4.5). Idempotent in effect: once
    /// posted, every current and future-until-recreated subscriber will
    /// eventually observe it.
    pub fn post_shutdown(&self) {
        let _ = self.tx.send(KeyboardEvent::Shutdown);
    }
}

fn reader_loop(tx: broadcast::Sender<KeyboardEvent>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                if tx.send(KeyboardEvent::Line(line)).is_err() {
                    debug!(target: "hermes::input", "no keyboard subscribers, dropping line");
                }
            }
            Err(e) => {
                warn!(target: "hermes::input", error = %e, "stdin read error, stopping reader");
                break;
            }
        }
    }
    let _ = tx.send(KeyboardEvent::Shutdown);
}

pub struct KeyboardSubscription {
    rx: broadcast::Receiver<KeyboardEvent>,
}

impl KeyboardSubscription {
    pub async fn recv(&mut self) -> Result<KeyboardEvent, Error> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Closed) => {
                Err(err_kind(ErrorKind::Transport, "keyboard hub closed"))
            }
            Err(broadcast::error::RecvError::Lagged(n)) => Err(err_kind(
                ErrorKind::Transport,
                format!("keyboard subscriber lagged by {n} lines"),
            )),
        }
    }
}

/// Cross-process reach (spec §4.5, §9): re-publish each keyboard line as a
/// control-plane [`Msg`] over `control`, for Nodes that live in a separate
/// process and therefore can't see the in-process broadcast bus. Runs until
/// the hub posts `Shutdown` or the send fails.
pub async fn republish_to_control(
    mut subscription: KeyboardSubscription,
    mut control: CoordinationClient,
    sender_id: GlobalNodeId,
) -> Result<(), Error> {
    let mut sequence = 0u64;
    loop {
        match subscription.recv().await? {
            KeyboardEvent::Line(line) => {
                sequence += 1;
                let msg = Msg::request(sender_id.clone(), monotonic_now(), sequence, MsgKind::Keyboard(line));
                control.send(&msg).await?;
            }
            KeyboardEvent::Shutdown => return Ok(()),
        }
    }
}

fn monotonic_now() -> Nanos {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Nanos)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_posted_shutdown() {
        let hub = KeyboardHub::spawn(8);
        let mut sub = hub.subscribe();
        hub.post_shutdown();
        assert_eq!(sub.recv().await.unwrap(), KeyboardEvent::Shutdown);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_line_once() {
        let hub = KeyboardHub::spawn(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        hub.tx.send(KeyboardEvent::Line("hello".into())).unwrap();
        assert_eq!(a.recv().await.unwrap(), KeyboardEvent::Line("hello".into()));
        assert_eq!(b.recv().await.unwrap(), KeyboardEvent::Line("hello".into()));
    }

    /// The real stdin reader thread is never joined (see module docs), so
    /// `republish_to_control` is the part of the fan-out this crate can
    /// actually bound: it has to return promptly once `DRAIN` posts the
    /// shutdown sentinel, not linger on the control socket (spec §8,
    /// invariant 6's "reader thread terminates within `drain_deadline_ms`").
    #[tokio::test]
    async fn republish_exits_promptly_after_shutdown() {
        use hermes_transport::{CoordinationServer, Endpoint};

        let endpoint = Endpoint::new("127.0.0.1", 28900);
        let server_task = tokio::spawn(async move {
            let mut server = CoordinationServer::bind(&endpoint).await.unwrap();
            loop {
                if server.recv().await.is_err() {
                    return;
                }
            }
        });

        let hub = KeyboardHub::spawn(8);
        let control = CoordinationClient::connect(&Endpoint::new("127.0.0.1", 28900)).await.unwrap();
        let sender_id = GlobalNodeId {
            broker_id: "b0".into(),
            node_id: "keyboard".into(),
        };
        let task = tokio::spawn(republish_to_control(hub.subscribe(), control, sender_id));

        hub.post_shutdown();
        tokio::time::timeout(std::time::Duration::from_millis(100), task)
            .await
            .expect("republish_to_control should exit within drain_deadline_ms of shutdown")
            .unwrap()
            .unwrap();

        server_task.abort();
    }
}
