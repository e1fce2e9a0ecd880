// A single request/reply socket is used for all Broker<->Node and
// Broker<->Broker coordination (spec §4.1, §4.2). `Pairing` tracks
// outstanding requests and matches each reply to its request by sequence
// number, alternating delivery between unsolicited one-way messages (e.g.
// `STATUS`) and completed request/reply pairs.

use crate::msg::Msg;
use hermes_base::{err, Error};
use std::collections::{BTreeMap, VecDeque};

struct Outstanding {
    req: Box<Msg>,
    res: Option<Box<Msg>>,
}

#[derive(Default)]
pub struct Pairing {
    /// Unsolicited one-way messages awaiting consumption.
    incoming: VecDeque<Box<Msg>>,
    /// Requests sent but not yet replied-to, or replied-to but not yet
    /// consumed by `recv`.
    requests: BTreeMap<u64, Outstanding>,
    /// Sequence numbers of requests whose reply has arrived.
    complete: VecDeque<u64>,
}

#[derive(Debug)]
pub enum Received {
    NoMsgs,
    Unsolicited(Box<Msg>),
    Paired { req: Box<Msg>, res: Box<Msg> },
}

impl Pairing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `req` was sent and a reply is expected.
    pub fn sent_request(&mut self, req: Box<Msg>) {
        self.requests.insert(
            req.sequence,
            Outstanding {
                req,
                res: None,
            },
        );
    }

    /// Feed one decoded incoming message into the pairing state.
    pub fn on_decoded(&mut self, msg: Box<Msg>) -> Result<(), Error> {
        if msg.response {
            if let Some(outstanding) = self.requests.get_mut(&msg.sequence) {
                if outstanding.res.is_some() {
                    return Err(err("duplicate response for sequence"));
                }
                outstanding.res = Some(msg);
                self.complete.push_back(outstanding.req.sequence);
            } else {
                return Err(err("response with no matching request"));
            }
        } else {
            self.incoming.push_back(msg);
        }
        Ok(())
    }

    /// Alternates between unsolicited messages and completed request/reply
    /// pairs so neither starves the other under steady unsolicited traffic.
    pub fn recv(&mut self) -> Result<Received, Error> {
        let prefer_unsolicited = (self.incoming.len() + self.complete.len()) % 2 == 0;
        if prefer_unsolicited {
            if let Some(msg) = self.incoming.pop_front() {
                return Ok(Received::Unsolicited(msg));
            }
        }
        if let Some(seq) = self.complete.pop_front() {
            let outstanding = self
                .requests
                .remove(&seq)
                .ok_or_else(|| err("missing request for completed sequence"))?;
            let res = outstanding
                .res
                .ok_or_else(|| err("complete sequence with no response"))?;
            return Ok(Received::Paired {
                req: outstanding.req,
                res,
            });
        }
        if let Some(msg) = self.incoming.pop_front() {
            return Ok(Received::Unsolicited(msg));
        }
        Ok(Received::NoMsgs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::GlobalNodeId;
    use crate::msg::MsgKind;

    fn gid(s: &str) -> GlobalNodeId {
        GlobalNodeId {
            broker_id: crate::ids::BrokerId(s.into()),
            node_id: crate::ids::NodeId(s.into()),
        }
    }

    #[test]
    fn pairs_request_and_reply() {
        let mut p = Pairing::new();
        let req = Box::new(Msg::request(gid("a"), 0, 1, MsgKind::Ready));
        p.sent_request(req.clone());
        let res = Box::new(req.reply(gid("b"), 1, MsgKind::Ready));
        p.on_decoded(res.clone()).unwrap();
        match p.recv().unwrap() {
            Received::Paired { req: r, res: s } => {
                assert_eq!(r.sequence, 1);
                assert_eq!(s.sequence, 1);
            }
            other => panic!("expected Paired, got {other:?}"),
        }
    }

    #[test]
    fn unsolicited_message_passes_through() {
        let mut p = Pairing::new();
        let status = Box::new(Msg::request(gid("a"), 0, 7, MsgKind::Status(crate::msg::StatusPayload { detail: "ok".into() })));
        p.on_decoded(status).unwrap();
        match p.recv().unwrap() {
            Received::Unsolicited(m) => assert_eq!(m.sequence, 7),
            other => panic!("expected Unsolicited, got {other:?}"),
        }
    }
}
