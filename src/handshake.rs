use crate::ofp_header::{Xid, OPENFLOW_0_04_VERSION};

/// Where a connection is in the OpenFlow handshake.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    New,
    HelloFailed,
    SendingFeatures,
    WaitingFeaturesReply,
    HandshakeComplete,
}

/// Side effects requested by a handshake transition, carried out by the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeAction {
    SendHello,
    SendFeaturesRequest,
    SendHelloFailed { xid: Xid },
    Close,
    SendDescRequest,
    SendSetConfig,
    RequestPortDescriptions,
    Completed,
}

/// Negotiated version and handshake state of one connection.
#[derive(Clone, Debug)]
pub struct Protocol {
    version: Option<u8>,
    state: HandshakeState,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::new()
    }
}

impl Protocol {
    pub fn new() -> Protocol {
        Protocol {
            version: None,
            state: HandshakeState::New,
        }
    }

    pub fn version(&self) -> Option<u8> {
        self.version
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == HandshakeState::New
    }

    pub fn is_during_setup(&self) -> bool {
        match self.state {
            HandshakeState::SendingFeatures | HandshakeState::WaitingFeaturesReply => true,
            _ => false,
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::HandshakeComplete
    }

    pub fn awaits_features_reply(&self) -> bool {
        self.state == HandshakeState::WaitingFeaturesReply
    }

    /// First hello from the peer, `negotiated` being the outcome of version negotiation.
    pub fn on_hello(&mut self, negotiated: Option<u8>, xid: Xid) -> Vec<HandshakeAction> {
        if self.state != HandshakeState::New {
            return vec![];
        }
        match negotiated {
            Some(version) => {
                self.version = Some(version);
                self.state = HandshakeState::SendingFeatures;
                vec![HandshakeAction::SendHello, HandshakeAction::SendFeaturesRequest]
            },
            None => {
                self.state = HandshakeState::HelloFailed;
                vec![HandshakeAction::SendHelloFailed { xid }, HandshakeAction::Close]
            }
        }
    }

    /// The features request left the wire. Returns whether the state advanced.
    pub fn on_features_request_sent(&mut self) -> bool {
        if self.state == HandshakeState::SendingFeatures {
            self.state = HandshakeState::WaitingFeaturesReply;
            true
        } else {
            false
        }
    }

    /// A features reply arrived. Replies outside of `WaitingFeaturesReply` only refresh
    /// the switch and produce no actions.
    pub fn on_features_reply(&mut self, send_set_config: bool) -> Vec<HandshakeAction> {
        if self.state != HandshakeState::WaitingFeaturesReply {
            return vec![];
        }
        self.state = HandshakeState::HandshakeComplete;
        let mut actions = vec![HandshakeAction::SendDescRequest];
        if send_set_config {
            actions.push(HandshakeAction::SendSetConfig);
        }
        if self.version.map_or(false, |v| v >= OPENFLOW_0_04_VERSION) {
            actions.push(HandshakeAction::RequestPortDescriptions);
        }
        actions.push(HandshakeAction::Completed);
        actions
    }

    /// Terminal failure: the connection is going away.
    pub fn fail(&mut self) {
        if self.state != HandshakeState::HandshakeComplete {
            self.state = HandshakeState::HelloFailed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_handshake() {
        let mut protocol = Protocol::new();
        assert!(protocol.is_new());

        let actions = protocol.on_hello(Some(4), 1);
        assert_eq!(actions, vec![HandshakeAction::SendHello, HandshakeAction::SendFeaturesRequest]);
        assert_eq!(protocol.state(), HandshakeState::SendingFeatures);
        assert_eq!(protocol.version(), Some(4));
        assert!(protocol.is_during_setup());

        // a reply before the request is known to be sent is not accepted
        assert!(protocol.on_features_reply(true).is_empty());

        assert!(protocol.on_features_request_sent());
        assert!(protocol.awaits_features_reply());
        assert!(!protocol.on_features_request_sent());

        let actions = protocol.on_features_reply(true);
        assert_eq!(actions, vec![HandshakeAction::SendDescRequest,
                                 HandshakeAction::SendSetConfig,
                                 HandshakeAction::RequestPortDescriptions,
                                 HandshakeAction::Completed]);
        assert!(protocol.is_established());
        assert!(!protocol.is_during_setup());

        // exactly one completion
        assert!(protocol.on_features_reply(true).is_empty());
    }

    #[test]
    fn test_1_0_handshake_without_set_config() {
        let mut protocol = Protocol::new();
        protocol.on_hello(Some(1), 1);
        protocol.on_features_request_sent();
        let actions = protocol.on_features_reply(false);
        assert_eq!(actions, vec![HandshakeAction::SendDescRequest, HandshakeAction::Completed]);
    }

    #[test]
    fn test_hello_failure_is_absorbing() {
        let mut protocol = Protocol::new();
        let actions = protocol.on_hello(None, 9);
        assert_eq!(actions, vec![HandshakeAction::SendHelloFailed { xid: 9 }, HandshakeAction::Close]);
        assert_eq!(protocol.state(), HandshakeState::HelloFailed);

        assert!(protocol.on_hello(Some(4), 10).is_empty());
        assert!(!protocol.on_features_request_sent());
        assert!(protocol.on_features_reply(true).is_empty());
        assert_eq!(protocol.state(), HandshakeState::HelloFailed);
    }

    #[test]
    fn test_fail_during_setup() {
        let mut protocol = Protocol::new();
        protocol.on_hello(Some(4), 1);
        protocol.fail();
        assert_eq!(protocol.state(), HandshakeState::HelloFailed);
        assert!(!protocol.is_during_setup());
    }
}
