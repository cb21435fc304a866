use std::collections::BTreeMap;
use std::time::Instant;

use crate::message::{FlowStats, PortDesc, SwitchDescription, SwitchFeatures};
use crate::ofp_device::{ConnectionId, DeviceId};

/// A switch port as the controller knows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    pub switch: DeviceId,
    pub port_no: u32,
    pub name: String,
    pub hw_addr: u64,
    pub config: u32,
    pub state: u32,
    pub speed: u32,
    pub active: bool,
}

impl Interface {
    pub fn from_port(switch: DeviceId, port: &PortDesc) -> Interface {
        Interface {
            switch,
            port_no: port.port_no,
            name: port.name.clone(),
            hw_addr: port.hw_addr,
            config: port.config,
            state: port.state,
            speed: port.curr,
            active: true,
        }
    }

    pub fn is_link_up(&self) -> bool {
        self.state & 1 == 0
    }
}

/// Changes `Switch::update_interface` made.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterfaceUpdate {
    Created,
    Modified { link_changed: bool },
}

/// What the controller remembers about a switch, connected or not.
#[derive(Clone, Debug)]
pub struct Switch {
    pub id: DeviceId,
    pub features: SwitchFeatures,
    pub description: Option<SwitchDescription>,
    pub flows: Vec<FlowStats>,
    pub interfaces: BTreeMap<u32, Interface>,
    pub last_seen: Instant,
    pub connection: Option<ConnectionId>,
}

impl Switch {
    pub fn new(features: SwitchFeatures, connection: ConnectionId) -> Switch {
        let mut switch = Switch {
            id: DeviceId(features.datapath_id),
            features: features.clone(),
            description: None,
            flows: vec![],
            interfaces: BTreeMap::new(),
            last_seen: Instant::now(),
            connection: Some(connection),
        };
        for port in &features.ports {
            switch.add_interface(port);
        }
        switch
    }

    pub fn update_lastseen(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Refresh a reconnected or re-described switch. Every port of the reply is
    /// (re)added and returned.
    pub fn update_features(&mut self, features: SwitchFeatures, connection: ConnectionId)
        -> Vec<Interface> {
        let added = features.ports.iter()
            .map(|port| self.add_interface(port))
            .collect();
        self.features = features;
        self.connection = Some(connection);
        self.update_lastseen();
        added
    }

    /// Insert or replace the interface described by `port`, as announced by the switch.
    pub fn add_interface(&mut self, port: &PortDesc) -> Interface {
        let interface = Interface::from_port(self.id, port);
        self.interfaces.insert(port.port_no, interface.clone());
        interface
    }

    /// Create or refresh the interface described by `port`.
    pub fn update_interface(&mut self, port: &PortDesc) -> InterfaceUpdate {
        let fresh = Interface::from_port(self.id, port);
        match self.interfaces.get_mut(&port.port_no) {
            Some(interface) => {
                let link_changed = interface.is_link_up() != fresh.is_link_up();
                *interface = fresh;
                InterfaceUpdate::Modified { link_changed }
            },
            None => {
                self.interfaces.insert(port.port_no, fresh);
                InterfaceUpdate::Created
            }
        }
    }

    /// Deactivate the interface, returning it if it was known.
    pub fn remove_interface(&mut self, port_no: u32) -> Option<Interface> {
        self.interfaces.get_mut(&port_no).map(|interface| {
            interface.active = false;
            interface.clone()
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}
