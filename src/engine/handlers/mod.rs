//! Packet, command and timer handlers.

mod advertise;
mod commands;
mod dispatch;
mod join;
mod message;
mod register;
mod reunion;
mod timer;
