use std::sync::Arc;

use tokio::time::{interval_at, sleep, Instant};

use crate::message::{FlowStats, Message, PortStats, StatsReq};
use crate::ofp_controller::{DeviceController, DeviceControllerApp, DeviceControllerEvent};
use crate::ofp_device::DeviceId;

const ECHO_PAYLOAD: &[u8] = b"ofp_core";

/// One polling cycle of a switch: wait for its slot, then ask for flows and ports,
/// unless the previous cycle is still unfinished.
pub async fn request_stats(controller: Arc<DeviceController>, dpid: DeviceId) {
    let delay = controller.schedule().delay_for(dpid);
    sleep(delay).await;

    if !controller.is_connected(dpid) {
        debug!("Switch {} went away before its stats request", dpid);
        return;
    }
    let flows_xid = controller.next_xid();
    let ports_xid = controller.next_xid();
    if !controller.multipart().begin_cycle(dpid, flows_xid, ports_xid) {
        return;
    }

    debug!("Requesting flow stats for {}, xid {}", dpid, flows_xid);
    controller.send_message(dpid, flows_xid, Message::StatsRequest(StatsReq::flows()));
    debug!("Requesting port stats for {}, xid {}", dpid, ports_xid);
    controller.send_message(dpid, ports_xid, Message::StatsRequest(StatsReq::ports()));
}

/// Periodically request flow and port stats from every connected switch.
pub struct StatsPolling {
    controller: Arc<DeviceController>,
}

impl StatsPolling {
    pub fn new(controller: Arc<DeviceController>) -> StatsPolling {
        StatsPolling { controller }
    }

    fn log_port_stats(&self, device_id: DeviceId, port_stats: &[PortStats]) {
        for port in port_stats {
            debug!("Port stats: {}:{} tx:{} tx_packets:{} tx_errors:{} tx_dropped:{} \
                    rx:{} rx_packets:{} rx_errors:{} rx_dropped:{}",
                   device_id, port.port_no, port.bytes.tx, port.packets.tx, port.errors.tx,
                   port.dropped.tx, port.bytes.rx, port.packets.rx, port.errors.rx,
                   port.dropped.rx);
        }
    }

    fn log_flow_stats(&self, device_id: DeviceId, flow_stats: &[FlowStats]) {
        for flow in flow_stats {
            debug!("Flow stats: device:{}, cookie:{}, table:{}, priority:{}, idle_timeout:{}, \
                    hard_timeout:{}, duration:{}.{} packets:{}, bytes:{}",
                   device_id, flow.cookie, flow.table_id, flow.priority, flow.idle_timeout,
                   flow.hard_timeout, flow.duration_sec, flow.duration_nsec, flow.packet_count,
                   flow.byte_count);
        }
    }
}

impl DeviceControllerApp for StatsPolling {
    fn event(&mut self, event: Arc<DeviceControllerEvent>) {
        match *event {
            DeviceControllerEvent::HandshakeCompleted(device_id) => {
                tokio::spawn(request_stats(self.controller.clone(), device_id));
            },
            DeviceControllerEvent::PortStats(device_id, ref port_stats) => {
                self.log_port_stats(device_id, port_stats);
            },
            DeviceControllerEvent::FlowStats(device_id, ref flow_stats) => {
                self.log_flow_stats(device_id, flow_stats);
            },
            _ => {}
        }
    }

    fn start(&mut self) {
        info!("Starting stats polling every {}s", self.controller.config().poll_interval);
        let controller = self.controller.clone();
        let period = controller.config().poll_interval();
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                let switches = controller.connected_switches();
                debug!("Polling {} switches", switches.len());
                for dpid in switches {
                    tokio::spawn(request_stats(controller.clone(), dpid));
                    if controller.config().send_echo_requests {
                        controller.send_message(dpid, controller.next_xid(),
                                                Message::EchoRequest(ECHO_PAYLOAD.to_vec()));
                    }
                }
            }
        });
    }
}
