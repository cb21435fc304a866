use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ControllerConfig;
use crate::message::{FlowStats, Message, PacketIn, PortReason, PortStats, PortStatus, StatsKind,
                     StatsResp, SwitchFeatures};
use crate::multipart::{FragmentOutcome, MultipartKind, MultipartReassembler};
use crate::ofp_device::{spawn_device, ChannelSettings, ConnectionId, Device, DeviceEvent, DeviceId,
                        InboundItem, Outbound};
use crate::ofp_header::{Xid, XidGenerator};
use crate::ofp_message::join_fragments;
use crate::ofp_serialization::{parse_description, parse_flow_stats, parse_port_descs,
                               parse_port_stats};
use crate::ofp_utils::lock;
use crate::packet::EthernetHeader;
use crate::stats_schedule::SwitchPollSchedule;
use crate::switch::{Interface, InterfaceUpdate, Switch};

/// What the controller tells its apps.
#[derive(Debug)]
pub enum DeviceControllerEvent {
    MessageIn(ConnectionId, Option<DeviceId>, Message),
    HandshakeCompleted(DeviceId),
    HelloFailed(ConnectionId),
    FlowStats(DeviceId, Vec<FlowStats>),
    PortStats(DeviceId, Vec<PortStats>),
    InterfaceCreated(Interface),
    InterfaceModified(Interface),
    InterfaceDeleted(Interface),
    LinkUp(Interface),
    LinkDown(Interface),
    MacReachable { switch: DeviceId, port: u32, mac: u64 },
    SwitchDisconnected(DeviceId),
}

pub trait DeviceControllerApp {
    fn event(&mut self, event: Arc<DeviceControllerEvent>);

    fn start(&mut self) {
        // Default implementation is empty
    }
}

struct DeviceControllerApps {
    apps: Vec<Box<dyn DeviceControllerApp + Sync + Send>>,
}

impl DeviceControllerApps {
    fn new() -> DeviceControllerApps {
        DeviceControllerApps { apps: Vec::new() }
    }

    fn start(&mut self) {
        for app in &mut self.apps {
            app.start();
        }
    }

    fn post(&mut self, event: DeviceControllerEvent) {
        let event = Arc::new(event);
        for app in &mut self.apps {
            app.event(event.clone());
        }
    }

    fn register_app(&mut self, app: Box<dyn DeviceControllerApp + Sync + Send>) {
        self.apps.push(app);
    }
}

/// Connections before and after their switch identified itself.
struct Devices {
    unknown_devices: HashMap<ConnectionId, Arc<Device>>,
    devices: HashMap<DeviceId, Arc<Device>>,
}

impl Devices {
    fn new() -> Devices {
        Devices {
            unknown_devices: HashMap::new(),
            devices: HashMap::new(),
        }
    }

    fn add_device(&mut self, device: Arc<Device>) {
        self.unknown_devices.insert(device.id(), device);
    }

    fn list_all_devices(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    fn handle_switch_connected(&mut self, connection: ConnectionId, dpid: DeviceId) {
        // move the connection from unknown to known devices
        let device = match self.unknown_devices.remove(&connection) {
            Some(device) => device,
            None => {
                if !self.devices.get(&dpid).map_or(false, |d| d.id() == connection) {
                    warn!("Couldn't find connection {} of switch {}", connection, dpid);
                }
                return;
            }
        };
        if let Some(previous) = self.devices.insert(dpid, device) {
            warn!("Switch {} reconnected on {}, closing {}", dpid, connection, previous.id());
            previous.close();
        }
    }

    fn remove(&mut self, connection: ConnectionId, dpid: Option<DeviceId>) {
        self.unknown_devices.remove(&connection);
        if let Some(dpid) = dpid {
            if self.devices.get(&dpid).map_or(false, |d| d.id() == connection) {
                self.devices.remove(&dpid);
            }
        }
    }

    fn get(&self, dpid: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(dpid).filter(|d| d.is_alive()).cloned()
    }
}

/// Owns every connection and switch, and reacts to what the switches say.
pub struct DeviceController {
    config: ControllerConfig,
    settings: Arc<ChannelSettings>,
    xids: Arc<XidGenerator>,
    next_connection: AtomicU64,
    devices: Mutex<Devices>,
    switches: Mutex<HashMap<DeviceId, Switch>>,
    multipart: MultipartReassembler,
    schedule: SwitchPollSchedule,
    event_tx: UnboundedSender<DeviceEvent>,
    event_rx: Mutex<Option<UnboundedReceiver<DeviceEvent>>>,
    apps: Mutex<DeviceControllerApps>,
}

impl DeviceController {
    pub fn new(config: ControllerConfig) -> DeviceController {
        let (event_tx, event_rx) = mpsc::unbounded();
        DeviceController {
            settings: Arc::new(ChannelSettings::from_config(&config)),
            xids: Arc::new(XidGenerator::new()),
            next_connection: AtomicU64::new(1),
            devices: Mutex::new(Devices::new()),
            switches: Mutex::new(HashMap::new()),
            multipart: MultipartReassembler::new(config.overlap_skip_threshold,
                                                 config.multipart_wait()),
            schedule: SwitchPollSchedule::new(config.poll_interval()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            apps: Mutex::new(DeviceControllerApps::new()),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn multipart(&self) -> &MultipartReassembler {
        &self.multipart
    }

    pub fn schedule(&self) -> &SwitchPollSchedule {
        &self.schedule
    }

    pub fn next_xid(&self) -> Xid {
        self.xids.next()
    }

    pub fn register_app(&self, app: Box<dyn DeviceControllerApp + Send + Sync>) {
        lock(&self.apps).register_app(app);
    }

    pub fn start(&self) {
        lock(&self.apps).start();
    }

    fn create_device(&self) -> (Arc<Device>, UnboundedReceiver<Outbound>) {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::SeqCst));
        let (device, writer_rx) = Device::new(id, self.settings.clone(), self.xids.clone());
        let device = Arc::new(device);
        lock(&self.devices).add_device(device.clone());
        (device, writer_rx)
    }

    /// Take over a freshly accepted connection. The switch speaks first.
    pub fn register_device<S>(&self, stream: S) -> ConnectionId
        where S: AsyncRead + AsyncWrite + Send + 'static {
        let (device, writer_rx) = self.create_device();
        let id = device.id();
        info!("New device connected: {}", id);
        spawn_device(device, stream, writer_rx, self.event_tx.clone());
        id
    }

    pub fn list_all_devices(&self) -> Vec<DeviceId> {
        lock(&self.devices).list_all_devices()
    }

    /// Switches with a live, established connection.
    pub fn connected_switches(&self) -> Vec<DeviceId> {
        let devices = lock(&self.devices);
        devices.list_all_devices().into_iter()
            .filter(|dpid| devices.get(dpid).map_or(false, |d| d.is_established()))
            .collect()
    }

    pub fn is_connected(&self, dpid: DeviceId) -> bool {
        lock(&self.devices).get(&dpid).map_or(false, |d| d.is_established())
    }

    /// Send to a connected switch. Returns whether the message was queued.
    pub fn send_message(&self, dpid: DeviceId, xid: Xid, message: Message) -> bool {
        let device = lock(&self.devices).get(&dpid);
        match device {
            Some(device) => {
                device.send_message(xid, message);
                true
            },
            None => {
                warn!("Could not find device with id {}", dpid);
                false
            }
        }
    }

    pub fn switch(&self, dpid: DeviceId) -> Option<Switch> {
        lock(&self.switches).get(&dpid).cloned()
    }

    fn post(&self, event: DeviceControllerEvent) {
        lock(&self.apps).post(event);
    }

    /// Dispatch loop over everything the connections report. Runs until every
    /// sender is gone, which never happens while the controller is alive.
    pub async fn run(self: Arc<Self>) {
        let rx = lock(&self.event_rx).take();
        let mut rx = match rx {
            Some(rx) => rx,
            None => {
                error!("Controller dispatch loop already running");
                return;
            }
        };
        while let Some(event) = rx.next().await {
            self.handle_device_event(event);
        }
    }

    pub fn handle_device_event(self: &Arc<Self>, event: DeviceEvent) {
        match event {
            DeviceEvent::Inbound { connection, switch, version, items, multipart } => {
                if let Some(dpid) = switch {
                    for (xid, count) in multipart {
                        self.multipart.fragments_observed(dpid, xid, count);
                    }
                    if let Some(known) = lock(&self.switches).get_mut(&dpid) {
                        known.update_lastseen();
                    }
                }
                for item in items {
                    match item {
                        InboundItem::Message(header, message) => {
                            self.handle_message(connection, switch, version, header.xid(), message);
                        },
                        InboundItem::HandshakeCompleted => match switch {
                            Some(dpid) => self.post(DeviceControllerEvent::HandshakeCompleted(dpid)),
                            None => error!("Handshake of {} completed without a switch", connection),
                        },
                    }
                }
            },
            DeviceEvent::HelloFailed { connection } => {
                self.post(DeviceControllerEvent::HelloFailed(connection));
            },
            DeviceEvent::Disconnected { connection, switch } => {
                info!("Connection {} closed, switch {:?}", connection, switch.map(|s| s.to_string()));
                lock(&self.devices).remove(connection, switch);
                if let Some(dpid) = switch {
                    let disconnected = match lock(&self.switches).get_mut(&dpid) {
                        Some(known) if known.connection == Some(connection) => {
                            known.connection = None;
                            true
                        },
                        _ => false,
                    };
                    if disconnected {
                        self.post(DeviceControllerEvent::SwitchDisconnected(dpid));
                    }
                }
            }
        }
    }

    fn handle_message(self: &Arc<Self>, connection: ConnectionId, switch: Option<DeviceId>,
                      version: u8, xid: Xid, message: Message) {
        match (&message, switch) {
            (Message::FeaturesReply(features), _) => {
                self.handle_features_reply(connection, features.clone());
            },
            (Message::StatsReply(reply), Some(dpid)) => {
                self.handle_stats_reply(dpid, version, xid, reply);
            },
            (Message::PortStatus(status), Some(dpid)) => {
                self.handle_port_status(dpid, status);
            },
            (Message::PacketIn(packet), Some(dpid)) => {
                self.handle_packet_in(dpid, packet);
            },
            (Message::StatsReply(_), None) | (Message::PortStatus(_), None) |
            (Message::PacketIn(_), None) => {
                warn!("Dropping {} from {} before its switch is known", message.msg_code(),
                      connection);
            },
            _ => (),
        }
        self.post(DeviceControllerEvent::MessageIn(connection, switch, message));
    }

    fn handle_features_reply(&self, connection: ConnectionId, features: SwitchFeatures) {
        let dpid = DeviceId(features.datapath_id);
        lock(&self.devices).handle_switch_connected(connection, dpid);
        self.multipart.register_switch(dpid);

        let events: Vec<DeviceControllerEvent> = {
            let mut switches = lock(&self.switches);
            match switches.get_mut(&dpid) {
                Some(known) => known.update_features(features, connection).into_iter()
                    .map(DeviceControllerEvent::InterfaceCreated)
                    .collect(),
                None => {
                    info!("New switch {} on {}", dpid, connection);
                    let created = Switch::new(features, connection);
                    let events = created.interfaces.values().cloned()
                        .map(DeviceControllerEvent::InterfaceCreated)
                        .collect();
                    switches.insert(dpid, created);
                    events
                }
            }
        };
        for event in events {
            self.post(event);
        }
    }

    fn handle_stats_reply(self: &Arc<Self>, dpid: DeviceId, version: u8, xid: Xid,
                          reply: &StatsResp) {
        match reply.kind {
            StatsKind::Desc => match parse_description(&reply.body) {
                Ok(description) => {
                    debug!("Switch {} is {} {}", dpid, description.manufacturer_desc,
                           description.hardware_desc);
                    if let Some(known) = lock(&self.switches).get_mut(&dpid) {
                        known.description = Some(description);
                    }
                },
                Err(e) => error!("Bad description reply from {}: {}", dpid, e),
            },
            StatsKind::PortDesc => match parse_port_descs(version, &reply.body) {
                Ok(ports) => {
                    let events: Vec<DeviceControllerEvent> = {
                        let mut switches = lock(&self.switches);
                        match switches.get_mut(&dpid) {
                            Some(known) => ports.iter()
                                .flat_map(|port| {
                                    let update = known.update_interface(port);
                                    interface_events(known, update, port.port_no)
                                })
                                .collect(),
                            None => vec![],
                        }
                    };
                    for event in events {
                        self.post(event);
                    }
                },
                Err(e) => error!("Bad port description reply from {}: {}", dpid, e),
            },
            StatsKind::Flow => self.reassemble(dpid, MultipartKind::Flows, version, xid, reply),
            StatsKind::Port => self.reassemble(dpid, MultipartKind::Ports, version, xid, reply),
            kind => debug!("Ignoring {:?} stats reply from {}", kind, dpid),
        }
    }

    fn reassemble(self: &Arc<Self>, dpid: DeviceId, kind: MultipartKind, version: u8, xid: Xid,
                  reply: &StatsResp) {
        let outcome = self.multipart.on_fragment(dpid, kind, xid, reply.body.clone(),
                                                 reply.more_follows());
        if outcome == FragmentOutcome::Last {
            let controller = self.clone();
            tokio::spawn(async move {
                controller.finish_multipart(dpid, kind, version, xid).await;
            });
        }
    }

    async fn finish_multipart(&self, dpid: DeviceId, kind: MultipartKind, version: u8, xid: Xid) {
        let fragments = match self.multipart.on_final_fragment(dpid, kind, xid).await {
            Some(fragments) => fragments,
            None => return,
        };
        let body = join_fragments(&fragments);
        match kind {
            MultipartKind::Flows => match parse_flow_stats(version, &body) {
                Ok(flows) => {
                    debug!("{} flows on switch {}", flows.len(), dpid);
                    match lock(&self.switches).get_mut(&dpid) {
                        Some(known) => known.flows = flows.clone(),
                        None => {
                            error!("Skipped flow stats of unknown switch {}, xid {}", dpid, xid);
                            return;
                        }
                    }
                    self.post(DeviceControllerEvent::FlowStats(dpid, flows));
                },
                Err(e) => error!("Bad flow stats from {}, xid {}: {}", dpid, xid, e),
            },
            MultipartKind::Ports => match parse_port_stats(version, &body) {
                Ok(stats) => self.post(DeviceControllerEvent::PortStats(dpid, stats)),
                Err(e) => error!("Bad port stats from {}, xid {}: {}", dpid, xid, e),
            },
        }
    }

    fn handle_port_status(&self, dpid: DeviceId, status: &PortStatus) {
        let events = {
            let mut switches = lock(&self.switches);
            let known = match switches.get_mut(&dpid) {
                Some(known) => known,
                None => return,
            };
            match status.reason {
                PortReason::PortAdd =>
                    vec![DeviceControllerEvent::InterfaceCreated(known.add_interface(&status.desc))],
                PortReason::PortModify => {
                    let update = known.update_interface(&status.desc);
                    interface_events(known, update, status.desc.port_no)
                },
                PortReason::PortDelete => known.remove_interface(status.desc.port_no)
                    .map(DeviceControllerEvent::InterfaceDeleted)
                    .into_iter()
                    .collect(),
            }
        };
        for event in events {
            self.post(event);
        }
    }

    fn handle_packet_in(&self, dpid: DeviceId, packet: &PacketIn) {
        match EthernetHeader::parse(&packet.payload) {
            Ok(eth) if eth.reveals_host() => {
                self.post(DeviceControllerEvent::MacReachable {
                    switch: dpid,
                    port: packet.in_port,
                    mac: eth.dl_src,
                });
            },
            Ok(_) => (),
            Err(e) => debug!("Packet in from {} without an ethernet header: {}", dpid, e),
        }
    }
}

fn interface_events(switch: &Switch, update: InterfaceUpdate, port_no: u32)
    -> Vec<DeviceControllerEvent> {
    let interface = match switch.interfaces.get(&port_no) {
        Some(interface) => interface.clone(),
        None => return vec![],
    };
    match update {
        InterfaceUpdate::Created => vec![DeviceControllerEvent::InterfaceCreated(interface)],
        InterfaceUpdate::Modified { link_changed: false } =>
            vec![DeviceControllerEvent::InterfaceModified(interface)],
        InterfaceUpdate::Modified { link_changed: true } => {
            let link = if interface.is_link_up() {
                DeviceControllerEvent::LinkUp(interface.clone())
            } else {
                DeviceControllerEvent::LinkDown(interface.clone())
            };
            vec![DeviceControllerEvent::InterfaceModified(interface), link]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};
    use std::time::Duration;

    use crate::message::{Hello, PortDesc};
    use crate::ofp_header::OfpHeader;
    use crate::ofp_serialization::marshal;
    use crate::openflow::MsgCode;

    const SWITCH: DeviceId = DeviceId(0xab);

    type Recorded = Arc<Mutex<Vec<Arc<DeviceControllerEvent>>>>;

    struct Recorder {
        events: Recorded,
    }

    impl DeviceControllerApp for Recorder {
        fn event(&mut self, event: Arc<DeviceControllerEvent>) {
            lock(&self.events).push(event);
        }
    }

    fn controller() -> (Arc<DeviceController>, Recorded) {
        let controller = Arc::new(DeviceController::new(ControllerConfig::default()));
        let events = Recorded::default();
        controller.register_app(Box::new(Recorder { events: events.clone() }));
        (controller, events)
    }

    fn port(port_no: u32, state: u32) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: 0x0200000000 + port_no as u64,
            name: format!("s1-eth{}", port_no),
            config: 0,
            state,
            curr: 0,
        }
    }

    fn features(ports: Vec<PortDesc>) -> Message {
        Message::FeaturesReply(SwitchFeatures {
            datapath_id: SWITCH.0,
            num_buffers: 256,
            num_tables: 254,
            auxiliary_id: 0,
            capabilities: 0,
            ports,
        })
    }

    fn inbound(connection: ConnectionId, switch: Option<DeviceId>, xid: Xid, messages: Vec<Message>)
        -> DeviceEvent {
        let multipart = match messages.iter().filter(|m| m.msg_code() == MsgCode::StatsResp).count() {
            0 => vec![],
            n => vec![(xid, n)],
        };
        DeviceEvent::Inbound {
            connection,
            switch,
            version: 4,
            items: messages.into_iter()
                .map(|m| InboundItem::Message(OfpHeader::new(4, 0, 8, xid), m))
                .collect(),
            multipart,
        }
    }

    /// A connection that negotiated 1.3 and is waiting for its features reply.
    fn connect(controller: &Arc<DeviceController>) -> (Arc<Device>, UnboundedReceiver<Outbound>) {
        let (device, writer_rx) = controller.create_device();
        let hello = marshal(4, 1, &Message::Hello(Hello::new(vec![4]))).unwrap();
        device.process_raw_in(&hello);
        device.message_sent(MsgCode::FeaturesReq);
        (device, writer_rx)
    }

    fn establish(controller: &Arc<DeviceController>) -> (Arc<Device>, UnboundedReceiver<Outbound>) {
        let (device, writer_rx) = connect(controller);
        let mut data = vec![4, 6, 0, 32, 0, 0, 0, 2];
        data.put_u64(SWITCH.0);
        data.extend_from_slice(&[0; 16]);
        let (events, mut events_rx) = mpsc::unbounded();
        device.dispatch(device.process_raw_in(&data), &events);
        while let Ok(Some(event)) = events_rx.try_next() {
            controller.handle_device_event(event);
        }
        (device, writer_rx)
    }

    fn flow_entry(priority: u16, packets: u64) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.put_u16(56);
        bytes.put_u8(0);
        bytes.put_u8(0);
        bytes.put_u32(5);
        bytes.put_u32(0);
        bytes.put_u16(priority);
        bytes.put_u16(0);
        bytes.put_u16(0);
        bytes.put_u16(0);
        bytes.put_u32(0);
        bytes.put_u64(0);
        bytes.put_u64(packets);
        bytes.put_u64(packets * 60);
        bytes.put_u16(1);
        bytes.put_u16(4);
        bytes.put_u32(0);
        bytes
    }

    fn flow_reply(more: bool, body: Vec<u8>) -> Message {
        Message::StatsReply(StatsResp {
            kind: StatsKind::Flow,
            flags: more as u16,
            body: Bytes::from(body),
        })
    }

    #[tokio::test]
    async fn test_handshake_registers_switch() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);

        assert!(controller.is_connected(SWITCH));
        assert_eq!(controller.connected_switches(), vec![SWITCH]);
        assert!(device.has_device_id(&SWITCH));
        assert_eq!(controller.switch(SWITCH).unwrap().connection, Some(device.id()));

        let events = lock(&events);
        assert!(events.iter().any(|e| match **e {
            DeviceControllerEvent::HandshakeCompleted(dpid) => dpid == SWITCH,
            _ => false,
        }));
    }

    #[tokio::test]
    async fn test_features_reply_ports_become_interfaces() {
        let (controller, events) = controller();
        let (device, _writer_rx) = connect(&controller);
        controller.handle_device_event(inbound(device.id(), None, 2,
                                               vec![features(vec![port(1, 0), port(2, 0)])]));

        let switch = controller.switch(SWITCH).unwrap();
        assert_eq!(switch.interfaces.len(), 2);
        let created = lock(&events).iter()
            .filter(|e| match ***e {
                DeviceControllerEvent::InterfaceCreated(_) => true,
                _ => false,
            })
            .count();
        assert_eq!(created, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_fragments_make_one_flow_stats_event() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        assert!(controller.multipart().begin_cycle(SWITCH, 100, 101));

        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 100,
                                               vec![flow_reply(true, flow_entry(10, 1))]));
        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 100,
                                               vec![flow_reply(false, flow_entry(20, 2))]));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let flow_events: Vec<Vec<FlowStats>> = lock(&events).iter()
            .filter_map(|e| match **e {
                DeviceControllerEvent::FlowStats(_, ref flows) => Some(flows.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(flow_events.len(), 1);
        let priorities: Vec<u16> = flow_events[0].iter().map(|f| f.priority).collect();
        assert_eq!(priorities, vec![10, 20]);
        assert_eq!(controller.switch(SWITCH).unwrap().flows.len(), 2);
        assert_eq!(controller.multipart().outstanding(SWITCH, MultipartKind::Flows), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_flow_reply_keeps_previous_flows() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        assert!(controller.multipart().begin_cycle(SWITCH, 100, 101));
        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 100,
                                               vec![flow_reply(false, flow_entry(10, 1))]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.switch(SWITCH).unwrap().flows.len(), 1);

        controller.multipart().issue_request(SWITCH, MultipartKind::Flows, 200);
        let mut body = flow_entry(20, 2);
        body.extend(&flow_entry(30, 3)[..20]);
        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 200,
                                               vec![flow_reply(false, body)]));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let flows = controller.switch(SWITCH).unwrap().flows;
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].priority, 10);
        let flow_events = lock(&events).iter()
            .filter(|e| match ***e {
                DeviceControllerEvent::FlowStats(..) => true,
                _ => false,
            })
            .count();
        assert_eq!(flow_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fragment_emits_nothing() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        assert!(controller.multipart().begin_cycle(SWITCH, 100, 101));

        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 99,
                                               vec![flow_reply(false, flow_entry(10, 1))]));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!lock(&events).iter().any(|e| match **e {
            DeviceControllerEvent::FlowStats(..) => true,
            _ => false,
        }));
        assert_eq!(controller.multipart().outstanding(SWITCH, MultipartKind::Flows), Some(100));
    }

    #[tokio::test]
    async fn test_port_status_link_change() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        let status = |reason, state| Message::PortStatus(PortStatus { reason, desc: port(3, state) });

        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 0, vec![
            status(PortReason::PortAdd, 0),
            status(PortReason::PortModify, 1),
            status(PortReason::PortDelete, 1),
        ]));

        let names: Vec<&'static str> = lock(&events).iter()
            .filter_map(|e| match **e {
                DeviceControllerEvent::InterfaceCreated(_) => Some("created"),
                DeviceControllerEvent::InterfaceModified(_) => Some("modified"),
                DeviceControllerEvent::LinkDown(_) => Some("down"),
                DeviceControllerEvent::LinkUp(_) => Some("up"),
                DeviceControllerEvent::InterfaceDeleted(_) => Some("deleted"),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["created", "modified", "down", "deleted"]);
        assert!(!controller.switch(SWITCH).unwrap().interfaces[&3].active);
    }

    #[tokio::test]
    async fn test_port_add_always_creates() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        let add = || Message::PortStatus(PortStatus { reason: PortReason::PortAdd, desc: port(3, 0) });

        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 0, vec![add(), add()]));

        let created = lock(&events).iter()
            .filter(|e| match ***e {
                DeviceControllerEvent::InterfaceCreated(ref interface) => interface.port_no == 3,
                DeviceControllerEvent::InterfaceModified(_) => panic!("ADD reported as modified"),
                _ => false,
            })
            .count();
        assert_eq!(created, 2);
        assert_eq!(controller.switch(SWITCH).unwrap().interfaces.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_features_reply_recreates_ports() {
        let (controller, events) = controller();
        let (device, _writer_rx) = connect(&controller);
        controller.handle_device_event(inbound(device.id(), None, 2, vec![features(vec![port(1, 0)])]));
        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 3,
                                               vec![features(vec![port(1, 0), port(2, 0)])]));

        let names: Vec<(&'static str, u32)> = lock(&events).iter()
            .filter_map(|e| match **e {
                DeviceControllerEvent::InterfaceCreated(ref i) => Some(("created", i.port_no)),
                DeviceControllerEvent::InterfaceModified(ref i) => Some(("modified", i.port_no)),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec![("created", 1), ("created", 1), ("created", 2)]);
    }

    #[tokio::test]
    async fn test_packet_in_reports_mac() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);
        let packet = |ethertype: [u8; 2]| {
            let mut payload = vec![0xff; 6];
            payload.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
            payload.extend_from_slice(&ethertype);
            Message::PacketIn(PacketIn {
                buffer_id: None,
                total_len: 14,
                in_port: 2,
                reason: 0,
                payload,
            })
        };

        controller.handle_device_event(inbound(device.id(), Some(SWITCH), 0, vec![
            packet([0x08, 0x00]),
            packet([0x88, 0xcc]),
            packet([0x86, 0xdd]),
        ]));

        let reachable: Vec<(DeviceId, u32, u64)> = lock(&events).iter()
            .filter_map(|e| match **e {
                DeviceControllerEvent::MacReachable { switch, port, mac } => Some((switch, port, mac)),
                _ => None,
            })
            .collect();
        assert_eq!(reachable, vec![(SWITCH, 2, 0x001122334455)]);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_switch() {
        let (controller, events) = controller();
        let (device, _writer_rx) = establish(&controller);

        device.close();
        controller.handle_device_event(DeviceEvent::Disconnected {
            connection: device.id(),
            switch: Some(SWITCH),
        });

        assert!(!controller.is_connected(SWITCH));
        assert!(controller.list_all_devices().is_empty());
        assert!(!controller.send_message(SWITCH, 1, Message::FeaturesReq));
        let switch = controller.switch(SWITCH).unwrap();
        assert_eq!(switch.connection, None);
        assert!(lock(&events).iter().any(|e| match **e {
            DeviceControllerEvent::SwitchDisconnected(dpid) => dpid == SWITCH,
            _ => false,
        }));
    }

    #[tokio::test]
    async fn test_send_message_uses_negotiated_version() {
        let (controller, _events) = controller();
        let (_device, mut writer_rx) = establish(&controller);
        while let Ok(Some(_)) = writer_rx.try_next() {}

        assert!(controller.send_message(SWITCH, 42, Message::EchoRequest(vec![])));
        assert_eq!(writer_rx.try_next().unwrap(), Some(Outbound::Message {
            version: 4,
            xid: 42,
            message: Message::EchoRequest(vec![]),
        }));
    }
}
