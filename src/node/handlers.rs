//! Node event loop: inbound packets, user commands, timer ticks and
//! outbound flushing.

use super::{Node, NodeError};
use crate::command::Command;
use crate::protocol::Packet;
use crate::transport::{now_ms, ReceivedPacket};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

impl Node {
    /// Run the event loop.
    ///
    /// Processes packets from the transport, commands from `commands`, and
    /// drives the engine timer every `node.tick_interval_ms`. After each
    /// step the engine's events are published and its outbound queues are
    /// flushed through the transport.
    ///
    /// Runs until the packet channel closes. A closed command channel only
    /// stops command processing.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), NodeError> {
        let mut packet_rx = self.packet_rx.take().ok_or(NodeError::NotStarted)?;

        let mut tick = tokio::time::interval(Duration::from_millis(self.config.node.tick_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        info!("Event loop started");

        loop {
            tokio::select! {
                packet = packet_rx.recv() => {
                    match packet {
                        Some(p) => self.process_received(p),
                        None => break, // channel closed
                    }
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(c) => self.process_command(c),
                        None => {
                            debug!("Command channel closed");
                            commands_open = false;
                        }
                    }
                }
                _ = tick.tick() => {
                    self.engine.tick(now_ms());
                }
            }

            self.publish_events();
            self.flush().await;
            self.publish_events();
        }

        info!("Event loop stopped (channel closed)");
        Ok(())
    }

    /// Decode and dispatch a single received packet.
    fn process_received(&mut self, packet: ReceivedPacket) {
        match Packet::decode(&packet.data) {
            Ok(decoded) => {
                trace!(
                    remote_addr = %packet.remote_addr,
                    packet_type = ?decoded.packet_type(),
                    source = %decoded.source(),
                    "Packet received"
                );
                self.engine.handle_packet(&decoded, packet.timestamp_ms);
            }
            Err(e) => {
                debug!(remote_addr = %packet.remote_addr, error = %e, "Dropping unframeable packet");
            }
        }
    }

    fn process_command(&mut self, command: Command) {
        debug!(command = %command, "User command");
        if let Err(e) = self.engine.handle_command(command, now_ms()) {
            warn!(error = %e, "Command refused");
        }
    }

    /// Forward engine events to the subscriber, if any.
    fn publish_events(&mut self) {
        for event in self.engine.drain_events() {
            debug!(event = %event, "Engine event");

            let Some(tx) = &self.event_tx else {
                continue;
            };
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Event subscriber lagging, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Event subscriber gone");
                    self.event_tx = None;
                }
            }
        }
    }

    /// Send every queued packet.
    ///
    /// The first failed send to an address drops the rest of its queue,
    /// closes the connection and reports the failure to the engine.
    async fn flush(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        for (addr, buffers) in self.engine.drain_outbound() {
            for buf in buffers {
                if let Err(e) = transport.send_async(&addr, &buf).await {
                    warn!(peer = %addr, error = %e, "Send failed, dropping connection");
                    transport.close(&addr);
                    self.engine.handle_transport_failure(&addr);
                    break;
                }
            }
        }
    }
}
