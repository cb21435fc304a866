extern crate byteorder;
extern crate bytes;
extern crate futures;
extern crate tokio;

#[macro_use]
extern crate log;

extern crate failure;
#[macro_use]
extern crate failure_derive;

extern crate serde;
extern crate toml;

pub mod apps;
pub mod config;

pub mod bits;

pub mod ofp_utils;

pub mod handshake;
pub mod message;
pub mod multipart;
pub mod negotiation;
pub mod ofp_controller;
pub mod ofp_device;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_serialization;
pub mod openflow;
pub mod openflow0x01;
pub mod openflow0x04;
pub mod packet;
pub mod slicer;
pub mod stats_schedule;
pub mod switch;
