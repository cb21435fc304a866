use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use futures::channel::mpsc;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::config::ControllerConfig;
use crate::handshake::{HandshakeAction, Protocol};
use crate::message::{ErrorMsg, Hello, Message, StatsReq, SwitchConfig};
use crate::negotiation::VersionNegotiator;
use crate::ofp_header::{OfpHeader, Xid, XidGenerator};
use crate::ofp_serialization::{marshal, parse_frame};
use crate::ofp_utils::lock;
use crate::openflow::MsgCode;
use crate::slicer::OfpSlicer;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Datapath id of a switch.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of one accepted connection. A switch reconnecting gets a new one.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The part of the controller configuration every connection needs.
#[derive(Debug)]
pub struct ChannelSettings {
    pub negotiator: VersionNegotiator,
    pub send_set_config: bool,
    pub send_features_request_on_echo: bool,
}

impl ChannelSettings {
    pub fn from_config(config: &ControllerConfig) -> ChannelSettings {
        ChannelSettings {
            negotiator: VersionNegotiator::new(config.supported_versions.iter().copied()),
            send_set_config: config.send_set_config,
            send_features_request_on_echo: config.send_features_request_on_echo,
        }
    }
}

/// Work for the writer task.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Message { version: u8, xid: Xid, message: Message },
    /// Flush what was queued before, then close the socket.
    Close,
}

/// One decoded inbound frame, or the point in the stream where the handshake finished.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundItem {
    Message(OfpHeader, Message),
    HandshakeCompleted,
}

/// What a connection reports to the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    Inbound {
        connection: ConnectionId,
        switch: Option<DeviceId>,
        version: u8,
        items: Vec<InboundItem>,
        /// Stats reply fragments per xid found in `items`.
        multipart: Vec<(Xid, usize)>,
    },
    HelloFailed {
        connection: ConnectionId,
    },
    Disconnected {
        connection: ConnectionId,
        switch: Option<DeviceId>,
    },
}

/// Result of feeding one chunk of bytes to a connection.
#[derive(Debug, Default)]
pub struct RawIn {
    pub version: Option<u8>,
    pub items: Vec<InboundItem>,
    pub multipart: Vec<(Xid, usize)>,
    pub actions: Vec<HandshakeAction>,
    pub replies: Vec<(Xid, Message)>,
    pub hello_failed: bool,
    pub close: bool,
}

impl RawIn {
    fn count_fragment(&mut self, xid: Xid) {
        match self.multipart.iter_mut().find(|(x, _)| *x == xid) {
            Some((_, count)) => *count += 1,
            None => self.multipart.push((xid, 1)),
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    remaining_data: BytesMut,
    protocol: Protocol,
    switch_id: Option<DeviceId>,
}

impl DeviceState {
    fn new() -> DeviceState {
        DeviceState {
            remaining_data: BytesMut::new(),
            protocol: Protocol::new(),
            switch_id: None,
        }
    }

    pub fn has_device_id(&self, device_id: &DeviceId) -> bool {
        self.switch_id.as_ref() == Some(device_id)
    }
}

/// Per connection half of the control channel: framing, handshake and the outbound queue.
pub struct Device {
    id: ConnectionId,
    alive: AtomicBool,
    state: Mutex<DeviceState>,
    writer: UnboundedSender<Outbound>,
    reprocess: Notify,
    closed: Notify,
    settings: Arc<ChannelSettings>,
    xids: Arc<XidGenerator>,
}

impl Device {
    pub fn new(id: ConnectionId, settings: Arc<ChannelSettings>, xids: Arc<XidGenerator>)
        -> (Device, UnboundedReceiver<Outbound>) {
        let (writer, writer_rx) = mpsc::unbounded();
        let device = Device {
            id,
            alive: AtomicBool::new(true),
            state: Mutex::new(DeviceState::new()),
            writer,
            reprocess: Notify::new(),
            closed: Notify::new(),
            settings,
            xids,
        };
        (device, writer_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn has_device_id(&self, device_id: &DeviceId) -> bool {
        lock(&self.state).has_device_id(device_id)
    }

    pub fn get_device_id(&self) -> Option<DeviceId> {
        lock(&self.state).switch_id
    }

    pub fn version(&self) -> Option<u8> {
        lock(&self.state).protocol.version()
    }

    pub fn is_established(&self) -> bool {
        lock(&self.state).protocol.is_established()
    }

    /// Append `data` to the unresolved bytes of the connection and process every
    /// complete frame, all under the connection lock.
    pub fn process_raw_in(&self, data: &[u8]) -> RawIn {
        let mut out = RawIn::default();
        let mut state = lock(&self.state);
        state.remaining_data.extend_from_slice(data);

        loop {
            let buffer = state.remaining_data.split().freeze();
            let mut held = BytesMut::new();
            let mut completed = false;
            let mut slicer = OfpSlicer::new(&buffer);

            for frame in &mut slicer {
                if state.protocol.is_new() {
                    self.process_hello(&mut state, frame, &mut out);
                    if out.close {
                        return out;
                    }
                    continue;
                }
                if !state.protocol.is_during_setup() && !state.protocol.is_established() {
                    return out;
                }

                let (header, message) = match parse_frame(frame) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        error!("Cannot decode message from {}: {}", self.id, e);
                        state.protocol.fail();
                        out.close = true;
                        return out;
                    }
                };

                if state.protocol.is_during_setup() || !held.is_empty() {
                    let features = match message {
                        Message::FeaturesReply(ref features)
                            if state.protocol.awaits_features_reply() => features.datapath_id,
                        _ => {
                            held.extend_from_slice(frame);
                            continue;
                        }
                    };
                    state.switch_id = Some(DeviceId(features));
                    let actions = state.protocol.on_features_reply(self.settings.send_set_config);
                    out.items.push(InboundItem::Message(header, message));
                    for action in actions {
                        if action == HandshakeAction::Completed {
                            out.items.push(InboundItem::HandshakeCompleted);
                        } else {
                            out.actions.push(action);
                        }
                    }
                    info!("OPENFLOW HANDSHAKE COMPLETE: {} switch {}", self.id, DeviceId(features));
                    completed = true;
                    continue;
                }

                self.inspect(&header, &message, &mut out);
                out.items.push(InboundItem::Message(header, message));
            }

            if slicer.is_malformed() {
                error!("Malformed frame length from {}, closing", self.id);
                state.protocol.fail();
                out.close = true;
                return out;
            }
            held.extend_from_slice(slicer.remainder());
            state.remaining_data = held;
            out.version = state.protocol.version();

            // frames held back during setup can run now
            if !(completed && state.protocol.is_established()) {
                return out;
            }
        }
    }

    fn process_hello(&self, state: &mut DeviceState, frame: &[u8], out: &mut RawIn) {
        let (header, message) = match parse_frame(frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Cannot decode hello from {}: {}", self.id, e);
                state.protocol.fail();
                out.close = true;
                return;
            }
        };
        let hello = match message {
            Message::Hello(hello) => hello,
            other => {
                error!("Expected hello from {}, got {}", self.id, other.msg_code());
                state.protocol.fail();
                out.close = true;
                return;
            }
        };

        let negotiated = self.settings.negotiator.negotiate(header.version(), &hello);
        match negotiated {
            Some(version) => info!("{} negotiated OpenFlow version 0x{:02x}", self.id, version),
            None => warn!("No common OpenFlow version with {}: header 0x{:02x}, bitmap {:?}",
                          self.id, header.version(), hello.versions),
        }
        out.actions.extend(state.protocol.on_hello(negotiated, header.xid()));
        out.version = Some(negotiated.unwrap_or(header.version()));
        if negotiated.is_none() {
            out.hello_failed = true;
            out.close = true;
        }
    }

    fn inspect(&self, header: &OfpHeader, message: &Message, out: &mut RawIn) {
        match message {
            Message::Error(err) => {
                error!("OFPT_ERROR: type {}, error code {}, from switch {}, xid {}/0x{:x}",
                       err.error_type, err.code, self.id, header.xid(), header.xid());
            },
            Message::EchoRequest(payload) => {
                out.replies.push((header.xid(), Message::EchoReply(payload.clone())));
            },
            Message::StatsReply(_) => out.count_fragment(header.xid()),
            _ => (),
        }
    }

    /// Queue the messages a handshake transition asked for.
    pub fn apply_actions(&self, version: u8, actions: &[HandshakeAction]) {
        for action in actions {
            match *action {
                HandshakeAction::SendHello => {
                    let hello = Hello::new(self.settings.negotiator.supported());
                    self.queue(version, self.xids.next(), Message::Hello(hello));
                },
                HandshakeAction::SendFeaturesRequest => {
                    self.queue(version, self.xids.next(), Message::FeaturesReq);
                },
                HandshakeAction::SendHelloFailed { xid } => {
                    self.queue(version, xid, Message::Error(ErrorMsg::hello_failed_incompatible()));
                },
                HandshakeAction::Close => self.close(),
                HandshakeAction::SendDescRequest => {
                    self.queue(version, self.xids.next(), Message::StatsRequest(StatsReq::desc()));
                },
                HandshakeAction::SendSetConfig => {
                    self.queue(version, self.xids.next(), Message::SetConfig(SwitchConfig::normal()));
                },
                HandshakeAction::RequestPortDescriptions => {
                    self.queue(version, self.xids.next(),
                               Message::StatsRequest(StatsReq::port_desc()));
                },
                HandshakeAction::Completed => (),
            }
        }
    }

    /// Carry out `raw` and forward what the controller has to see.
    pub fn dispatch(&self, raw: RawIn, events: &UnboundedSender<DeviceEvent>) {
        if let Some(version) = raw.version {
            self.apply_actions(version, &raw.actions);
            for (xid, reply) in raw.replies {
                self.queue(version, xid, reply);
            }
            if !raw.items.is_empty() {
                let event = DeviceEvent::Inbound {
                    connection: self.id,
                    switch: self.get_device_id(),
                    version,
                    items: raw.items,
                    multipart: raw.multipart,
                };
                if events.unbounded_send(event).is_err() {
                    warn!("Controller is gone, dropping messages of {}", self.id);
                }
            }
        }
        if raw.hello_failed {
            let _ = events.unbounded_send(DeviceEvent::HelloFailed { connection: self.id });
        }
        if raw.close {
            self.close();
        }
    }

    fn queue(&self, version: u8, xid: Xid, message: Message) {
        if !self.is_alive() {
            debug!("Not sending {} to closed connection {}", message.msg_code(), self.id);
            return;
        }
        if self.writer.unbounded_send(Outbound::Message { version, xid, message }).is_err() {
            warn!("Writer of {} is gone", self.id);
        }
    }

    /// Send a message with the negotiated version of the connection.
    pub fn send_message(&self, xid: Xid, message: Message) {
        match self.version() {
            Some(version) => self.queue(version, xid, message),
            None => warn!("Cannot send {} to {} before version negotiation",
                          message.msg_code(), self.id),
        }
    }

    /// The writer put a message of type `code` on the wire.
    pub fn message_sent(&self, code: MsgCode) {
        match code {
            MsgCode::FeaturesReq => {
                let advanced = lock(&self.state).protocol.on_features_request_sent();
                if advanced {
                    self.reprocess.notify_one();
                }
            },
            MsgCode::EchoResp if self.settings.send_features_request_on_echo => {
                if self.is_established() {
                    self.send_message(self.xids.next(), Message::FeaturesReq);
                }
            },
            _ => (),
        }
    }

    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            info!("Closing connection {}", self.id);
            lock(&self.state).protocol.fail();
            let _ = self.writer.unbounded_send(Outbound::Close);
            self.closed.notify_one();
        }
    }
}

/// Read the socket until it ends or the connection is closed.
pub async fn run_reader<R>(device: Arc<Device>, mut reader: R, events: UnboundedSender<DeviceEvent>)
    where R: AsyncRead + Unpin {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while device.is_alive() {
        let read = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Device {} disconnected", device.id());
                    None
                },
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Error reading from {}: {}", device.id(), e);
                    None
                }
            },
            _ = device.reprocess.notified() => Some(0),
            _ = device.closed.notified() => None,
        };
        let n = match read {
            Some(n) => n,
            None => break,
        };
        let raw = device.process_raw_in(&buf[..n]);
        device.dispatch(raw, &events);
    }
    device.close();
    let _ = events.unbounded_send(DeviceEvent::Disconnected {
        connection: device.id(),
        switch: device.get_device_id(),
    });
}

/// Write queued messages, reporting each one to the device once written.
pub async fn run_writer<W>(device: Arc<Device>, mut writer: W, mut rx: UnboundedReceiver<Outbound>)
    where W: AsyncWrite + Unpin {
    while let Some(outbound) = rx.next().await {
        let (version, xid, message) = match outbound {
            Outbound::Message { version, xid, message } => (version, xid, message),
            Outbound::Close => break,
        };
        let bytes = match marshal(version, xid, &message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Cannot encode {} for {}: {}", message.msg_code(), device.id(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("Error writing to {}: {}", device.id(), e);
            break;
        }
        trace!("Sent {} xid {} to {}", message.msg_code(), xid, device.id());
        device.message_sent(message.msg_code());
    }
    let _ = writer.shutdown().await;
    device.close();
}

/// Start the reader and writer tasks of a connection.
pub fn spawn_device<S>(device: Arc<Device>, stream: S, writer_rx: UnboundedReceiver<Outbound>,
                       events: UnboundedSender<DeviceEvent>)
    where S: AsyncRead + AsyncWrite + Send + 'static {
    let (read, write) = tokio::io::split(stream);
    tokio::spawn(run_writer(device.clone(), write, writer_rx));
    tokio::spawn(run_reader(device, read, events));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use std::time::Duration;

    fn settings(send_features_request_on_echo: bool) -> Arc<ChannelSettings> {
        Arc::new(ChannelSettings {
            negotiator: VersionNegotiator::new(vec![1, 4]),
            send_set_config: true,
            send_features_request_on_echo,
        })
    }

    fn device() -> (Device, UnboundedReceiver<Outbound>) {
        Device::new(ConnectionId(1), settings(false), Arc::new(XidGenerator::new()))
    }

    fn features_reply_1_3(xid: Xid, dpid: u64) -> Vec<u8> {
        let mut frame = vec![4, 6, 0, 32];
        frame.put_u32(xid);
        frame.put_u64(dpid);
        frame.extend_from_slice(&[0, 0, 1, 0, 254, 0, 0, 0]);
        frame.extend_from_slice(&[0; 8]);
        frame
    }

    fn multipart_reply_1_3(xid: Xid, kind: u16, more: bool, body: &[u8]) -> Vec<u8> {
        let mut frame = vec![4, 19];
        frame.put_u16(16 + body.len() as u16);
        frame.put_u32(xid);
        frame.put_u16(kind);
        frame.put_u16(more as u16);
        frame.extend_from_slice(&[0; 4]);
        frame.extend_from_slice(body);
        frame
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut queued = vec![];
        while let Ok(Some(outbound)) = rx.try_next() {
            queued.push(outbound);
        }
        queued
    }

    fn codes(queued: &[Outbound]) -> Vec<MsgCode> {
        queued.iter().filter_map(|outbound| match outbound {
            Outbound::Message { message, .. } => Some(message.msg_code()),
            Outbound::Close => None,
        }).collect()
    }

    fn hello(version: u8, versions: Vec<u8>) -> Vec<u8> {
        marshal(version, 1, &Message::Hello(Hello::new(versions))).unwrap()
    }

    fn establish(device: &Device, rx: &mut UnboundedReceiver<Outbound>) {
        device.process_raw_in(&hello(4, vec![1, 4]));
        device.message_sent(MsgCode::FeaturesReq);
        let raw = device.process_raw_in(&features_reply_1_3(2, 0xab));
        device.apply_actions(4, &raw.actions);
        drain(rx);
    }

    #[test]
    fn test_hello_starts_handshake() {
        let (device, mut rx) = device();
        let raw = device.process_raw_in(&hello(4, vec![1, 4]));
        assert_eq!(raw.version, Some(4));
        assert_eq!(raw.actions, vec![HandshakeAction::SendHello,
                                     HandshakeAction::SendFeaturesRequest]);
        device.apply_actions(4, &raw.actions);

        let queued = drain(&mut rx);
        assert_eq!(codes(&queued), vec![MsgCode::Hello, MsgCode::FeaturesReq]);
        match &queued[0] {
            Outbound::Message { version, message: Message::Hello(hello), .. } => {
                assert_eq!(*version, 4);
                assert_eq!(hello.versions, vec![1, 4]);
            },
            other => panic!("Should be a hello, got {:?}", other),
        }
    }

    #[test]
    fn test_incompatible_hello_fails_once() {
        let (device, mut rx) = device();
        let (events, mut events_rx) = mpsc::unbounded();
        let raw = device.process_raw_in(&hello(4, vec![9]));
        assert!(raw.hello_failed);
        device.dispatch(raw, &events);

        let queued = drain(&mut rx);
        assert_eq!(codes(&queued), vec![MsgCode::Error]);
        assert_eq!(queued.last(), Some(&Outbound::Close));
        match &queued[0] {
            Outbound::Message { xid, message: Message::Error(err), .. } => {
                assert_eq!(*xid, 1);
                assert_eq!(err.error_type, 0);
                assert_eq!(err.code, 0);
            },
            other => panic!("Should be an error, got {:?}", other),
        }
        assert!(!device.is_alive());
        assert_eq!(events_rx.try_next().unwrap(),
                   Some(DeviceEvent::HelloFailed { connection: ConnectionId(1) }));

        // nothing more is processed or sent
        let raw = device.process_raw_in(&hello(4, vec![4]));
        assert!(raw.actions.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_hello_bitmap_past_a_byte_fails() {
        let (device, _rx) = device();
        // 1.0 header, bitmap of nine words naming only version 257
        let mut frame = vec![1, 0];
        frame.put_u16(8 + 4 + 9 * 4);
        frame.put_u32(5);
        frame.put_u16(1);
        frame.put_u16(4 + 9 * 4);
        for word in 0..9 {
            frame.put_u32(if word == 8 { 1 << 1 } else { 0 });
        }

        let raw = device.process_raw_in(&frame);
        assert!(raw.hello_failed);
        assert!(raw.close);
        assert_eq!(raw.version, Some(1));
    }

    #[test]
    fn test_frames_are_held_until_features_request_is_sent() {
        let (device, mut rx) = device();
        let mut data = hello(4, vec![1, 4]);
        data.extend(marshal(4, 77, &Message::EchoRequest(b"hi".to_vec())).unwrap());
        data.extend(features_reply_1_3(2, 0xab));

        let raw = device.process_raw_in(&data);
        assert!(raw.items.is_empty());
        device.apply_actions(4, &raw.actions);
        drain(&mut rx);

        device.message_sent(MsgCode::FeaturesReq);
        let raw = device.process_raw_in(&[]);
        assert_eq!(raw.items.len(), 3);
        match &raw.items[0] {
            InboundItem::Message(_, Message::FeaturesReply(features)) =>
                assert_eq!(features.datapath_id, 0xab),
            other => panic!("Should be the features reply, got {:?}", other),
        }
        assert_eq!(raw.items[1], InboundItem::HandshakeCompleted);
        match &raw.items[2] {
            InboundItem::Message(header, Message::EchoRequest(_)) => assert_eq!(header.xid(), 77),
            other => panic!("Should be the echo request, got {:?}", other),
        }
        assert_eq!(raw.actions, vec![HandshakeAction::SendDescRequest,
                                     HandshakeAction::SendSetConfig,
                                     HandshakeAction::RequestPortDescriptions]);
        assert_eq!(raw.replies, vec![(77, Message::EchoReply(b"hi".to_vec()))]);
        assert!(device.is_established());
        assert!(device.has_device_id(&DeviceId(0xab)));
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let (device, mut rx) = device();
        establish(&device, &mut rx);

        let frame = marshal(4, 5, &Message::EchoRequest(b"abcd".to_vec())).unwrap();
        let raw = device.process_raw_in(&frame[..5]);
        assert!(raw.items.is_empty());
        let raw = device.process_raw_in(&frame[5..]);
        assert_eq!(raw.items.len(), 1);
    }

    #[test]
    fn test_stats_fragments_are_counted_per_xid() {
        let (device, mut rx) = device();
        establish(&device, &mut rx);

        let mut data = multipart_reply_1_3(10, 1, true, &[1, 2]);
        data.extend(multipart_reply_1_3(11, 4, false, &[]));
        data.extend(multipart_reply_1_3(10, 1, false, &[3]));
        let raw = device.process_raw_in(&data);
        assert_eq!(raw.items.len(), 3);
        assert_eq!(raw.multipart, vec![(10, 2), (11, 1)]);
    }

    #[test]
    fn test_decode_failure_closes() {
        let (device, mut rx) = device();
        establish(&device, &mut rx);
        let (events, _events_rx) = mpsc::unbounded();

        let raw = device.process_raw_in(&[4, 99, 0, 8, 0, 0, 0, 1]);
        assert!(raw.close);
        device.dispatch(raw, &events);
        assert!(!device.is_alive());
        assert_eq!(drain(&mut rx), vec![Outbound::Close]);
    }

    #[test]
    fn test_malformed_length_closes() {
        let (device, mut rx) = device();
        establish(&device, &mut rx);
        let raw = device.process_raw_in(&[4, 2, 0, 4, 0, 0, 0, 1]);
        assert!(raw.close);
    }

    #[test]
    fn test_features_request_on_echo() {
        let (device, mut rx) = Device::new(ConnectionId(1), settings(true),
                                           Arc::new(XidGenerator::new()));
        establish(&device, &mut rx);
        device.message_sent(MsgCode::EchoResp);
        assert_eq!(codes(&drain(&mut rx)), vec![MsgCode::FeaturesReq]);
    }

    #[tokio::test]
    async fn test_connection_over_duplex() {
        let (device, writer_rx) = device();
        let device = Arc::new(device);
        let (events, mut events_rx) = mpsc::unbounded();
        let (switch, controller) = tokio::io::duplex(4096);
        spawn_device(device.clone(), controller, writer_rx, events);

        let (mut switch_read, mut switch_write) = tokio::io::split(switch);
        switch_write.write_all(&hello(4, vec![4])).await.unwrap();

        let mut header = [0u8; 8];
        switch_read.read_exact(&mut header).await.unwrap();
        assert_eq!(header[1], 0);
        let length = OfpHeader::peek_length(&header).unwrap();
        let mut body = vec![0u8; length - 8];
        switch_read.read_exact(&mut body).await.unwrap();
        switch_read.read_exact(&mut header).await.unwrap();
        assert_eq!(header[1], 5);

        switch_write.write_all(&features_reply_1_3(header[7] as u32, 7)).await.unwrap();
        match events_rx.next().await {
            Some(DeviceEvent::Inbound { switch, items, .. }) => {
                assert_eq!(switch, Some(DeviceId(7)));
                assert_eq!(items.last(), Some(&InboundItem::HandshakeCompleted));
            },
            other => panic!("Should be inbound messages, got {:?}", other),
        }

        drop(switch_write);
        drop(switch_read);
        let disconnected = tokio::time::timeout(Duration::from_secs(5), events_rx.next()).await;
        assert_eq!(disconnected.unwrap(), Some(DeviceEvent::Disconnected {
            connection: ConnectionId(1),
            switch: Some(DeviceId(7)),
        }));
        assert!(!device.is_alive());
    }
}
