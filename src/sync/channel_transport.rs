//! Threaded transport: the authority runs on its own thread and every
//! participant exchanges serde_json frames with it over `std::sync::mpsc`.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::errors::SyncError;
use crate::sync::transport::{
    AuthorityHost, Delivery, NetCommand, NetEvent, ParticipantId, PeerLink, Recipient,
};

enum HostFrame {
    Connect {
        participant: ParticipantId,
        outbound: Sender<String>,
    },
    Command {
        from: ParticipantId,
        frame: String,
    },
    Disconnect {
        participant: ParticipantId,
    },
    Shutdown,
}

/// Handle to the authority thread.
pub struct ChannelTransport {
    frames: Sender<HostFrame>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelTransport {
    pub fn spawn() -> Self {
        let (frames, inbound) = mpsc::channel::<HostFrame>();
        let handle = thread::spawn(move || run_host(inbound));
        Self {
            frames,
            handle: Some(handle),
        }
    }

    pub fn connect(&self, participant: ParticipantId) -> Result<ChannelLink, SyncError> {
        let (outbound, events) = mpsc::channel::<String>();
        self.frames
            .send(HostFrame::Connect {
                participant,
                outbound,
            })
            .map_err(|_| SyncError::Disconnected)?;
        Ok(ChannelLink {
            id: participant,
            frames: self.frames.clone(),
            events,
        })
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        // The host may already be gone; either way the thread is done after this.
        let _ = self.frames.send(HostFrame::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("authority thread panicked");
            }
        }
    }
}

fn run_host(inbound: Receiver<HostFrame>) {
    let mut host = AuthorityHost::new();
    let mut outbound: BTreeMap<ParticipantId, Sender<String>> = BTreeMap::new();

    while let Ok(frame) = inbound.recv() {
        let deliveries = match frame {
            HostFrame::Connect {
                participant,
                outbound: sender,
            } => {
                outbound.insert(participant, sender);
                host.connect(participant)
            }
            HostFrame::Command { from, frame } => match serde_json::from_str::<NetCommand>(&frame) {
                Ok(command) => host.handle(from, command),
                Err(err) => {
                    error!(from, %err, "undecodable command frame dropped");
                    Vec::new()
                }
            },
            HostFrame::Disconnect { participant } => {
                outbound.remove(&participant);
                host.disconnect(participant)
            }
            HostFrame::Shutdown => break,
        };
        dispatch(&outbound, deliveries);
    }
    debug!("authority thread stopped");
}

fn dispatch(outbound: &BTreeMap<ParticipantId, Sender<String>>, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        let frame = match serde_json::to_string(&delivery.event) {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "event frame could not be encoded");
                continue;
            }
        };
        match delivery.to {
            Recipient::All => {
                for sender in outbound.values() {
                    let _ = sender.send(frame.clone());
                }
            }
            Recipient::Only(participant) => {
                if let Some(sender) = outbound.get(&participant) {
                    let _ = sender.send(frame);
                }
            }
        }
    }
}

pub struct ChannelLink {
    id: ParticipantId,
    frames: Sender<HostFrame>,
    events: Receiver<String>,
}

impl PeerLink for ChannelLink {
    fn local_id(&self) -> ParticipantId {
        self.id
    }

    fn send(&mut self, command: NetCommand) -> Result<(), SyncError> {
        let frame = serde_json::to_string(&command)?;
        self.frames
            .send(HostFrame::Command {
                from: self.id,
                frame,
            })
            .map_err(|_| SyncError::Disconnected)
    }

    fn poll(&mut self) -> Option<NetEvent> {
        loop {
            match self.events.try_recv() {
                Ok(frame) => match serde_json::from_str(&frame) {
                    Ok(event) => return Some(event),
                    Err(err) => error!(participant = self.id, %err, "undecodable event frame dropped"),
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        let _ = self.frames.send(HostFrame::Disconnect {
            participant: self.id,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn next_event(link: &mut ChannelLink) -> NetEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = link.poll() {
                return event;
            }
            assert!(Instant::now() < deadline, "no event arrived in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn list_writes_reach_every_participant() {
        let transport = ChannelTransport::spawn();
        let mut owner = transport.connect(1).expect("connect should succeed");
        let mut observer = transport.connect(2).expect("connect should succeed");

        owner
            .send(NetCommand::ChangeOwnership { object: 1 })
            .expect("send should succeed");
        owner
            .send(NetCommand::ListAdd {
                object: 1,
                channel: 3,
                index: 0,
                value: 796,
            })
            .expect("send should succeed");

        assert!(matches!(
            next_event(&mut observer),
            NetEvent::OwnershipChanged { owner: 1, claimed: true, .. }
        ));
        assert_eq!(
            next_event(&mut observer),
            NetEvent::ListAdd {
                object: 1,
                channel: 3,
                origin: 1,
                index: 0,
                value: 796,
            }
        );
        assert!(matches!(
            next_event(&mut owner),
            NetEvent::OwnershipChanged { owner: 1, .. }
        ));
    }

    #[test]
    fn late_joiner_receives_the_list() {
        let transport = ChannelTransport::spawn();
        let mut owner = transport.connect(1).expect("connect should succeed");
        owner
            .send(NetCommand::ChangeOwnership { object: 1 })
            .expect("send should succeed");
        owner
            .send(NetCommand::ListAdd {
                object: 1,
                channel: 3,
                index: 0,
                value: 5,
            })
            .expect("send should succeed");
        // Wait until the host has processed the add.
        next_event(&mut owner);
        next_event(&mut owner);

        let mut joiner = transport.connect(2).expect("connect should succeed");
        assert!(matches!(next_event(&mut joiner), NetEvent::OwnershipChanged { .. }));
        assert_eq!(
            next_event(&mut joiner),
            NetEvent::ListFull {
                object: 1,
                channel: 3,
                values: vec![5],
            }
        );
    }
}
