use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc,
};
use zw_core::definitions::{CommandClasses, NodeId};
use zw_core::security::{
    NetworkKeys, S0_NONCE_LENGTH, compute_mac, decrypt_aes_ofb, encrypt_aes_ofb, random_nonce,
};

const SECURITY_NONCE_GET: u8 = 0x40;
const SECURITY_NONCE_REPORT: u8 = 0x80;
const SECURITY_MESSAGE_ENCAP: u8 = 0x81;
const SECURITY_MESSAGE_ENCAP_NONCE_GET: u8 = 0xc1;

/// How many nonces we keep alive for the peer. Each is single-use.
const MAX_ISSUED_NONCES: usize = 4;

/// The S0 security scheme: every protected command is wrapped in a
/// nonce handshake, AES-OFB encryption and a CBC-MAC.
#[derive(Default)]
pub struct SecurityCc {
    info: CcInfo,
    keys: Option<NetworkKeys>,
    /// Nonces we handed to the peer, newest last. Identified by their
    /// first byte.
    issued_nonces: Vec<[u8; S0_NONCE_LENGTH]>,
}

// Key material stays out of Debug output
impl std::fmt::Debug for SecurityCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityCc")
            .field("info", &self.info)
            .field("has_key", &self.keys.is_some())
            .field("issued_nonces", &self.issued_nonces.len())
            .finish()
    }
}

impl SecurityCc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network_key(network_key: &[u8; 16]) -> Self {
        Self {
            keys: Some(NetworkKeys::derive(network_key)),
            ..Self::default()
        }
    }

    pub fn set_network_key(&mut self, network_key: &[u8; 16]) {
        self.keys = Some(NetworkKeys::derive(network_key));
    }

    pub fn has_key(&self) -> bool {
        self.keys.is_some()
    }

    /// Starts the handshake for an outbound secure frame
    pub fn nonce_get(&self) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), SECURITY_NONCE_GET])
            .expecting(self.cc_id(), SECURITY_NONCE_REPORT)
    }

    /// Answers a peer's NonceGet with a fresh nonce, remembering it so the
    /// following MessageEncap can be verified
    pub fn make_nonce_report(&mut self) -> OutgoingCc {
        let nonce = random_nonce();
        if self.issued_nonces.len() >= MAX_ISSUED_NONCES {
            self.issued_nonces.remove(0);
        }
        self.issued_nonces.push(nonce);

        let mut cc_bytes = vec![self.cc_id(), SECURITY_NONCE_REPORT];
        cc_bytes.extend_from_slice(&nonce);
        OutgoingCc::new(cc_bytes)
    }

    /// Wraps an inner frame into a MessageEncap using the receiver's nonce
    pub fn encrypt_message(
        &self,
        inner: &[u8],
        own_node_id: NodeId,
        target_node_id: NodeId,
        receiver_nonce: &[u8; S0_NONCE_LENGTH],
    ) -> Result<Vec<u8>, CcError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| CcError::SecurityFailure("no network key configured".into()))?;

        let sender_nonce = random_nonce();
        let iv: Vec<u8> = sender_nonce
            .iter()
            .chain(receiver_nonce.iter())
            .copied()
            .collect();

        // The encrypted part is a sequencing byte (0 = unsequenced)
        // followed by the inner frame
        let mut plaintext = vec![0u8];
        plaintext.extend_from_slice(inner);
        let ciphertext = encrypt_aes_ofb(&plaintext, &keys.enc_key, &iv);

        let mac = {
            let mut auth_data = vec![
                SECURITY_MESSAGE_ENCAP,
                own_node_id.into(),
                target_node_id.into(),
                ciphertext.len() as u8,
            ];
            auth_data.extend_from_slice(&ciphertext);
            compute_mac(&auth_data, &keys.auth_key, &iv)
        };

        let mut cc_bytes = vec![self.cc_id(), SECURITY_MESSAGE_ENCAP];
        cc_bytes.extend_from_slice(&sender_nonce);
        cc_bytes.extend_from_slice(&ciphertext);
        cc_bytes.push(receiver_nonce[0]);
        cc_bytes.extend_from_slice(&mac);
        Ok(cc_bytes)
    }

    fn decrypt_message(
        &mut self,
        cmd: u8,
        payload: &[u8],
        sender: NodeId,
        receiver: NodeId,
    ) -> Result<Vec<u8>, CcError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| CcError::SecurityFailure("no network key configured".into()))?;

        // sender nonce (8) | ciphertext (>= 2) | nonce id (1) | mac (8)
        if payload.len() < S0_NONCE_LENGTH + 2 + 1 + 8 {
            return Err(CcError::Malformed("encap frame too short".into()));
        }
        let sender_nonce = &payload[..S0_NONCE_LENGTH];
        let mac_offset = payload.len() - 8;
        let nonce_id = payload[mac_offset - 1];
        let ciphertext = &payload[S0_NONCE_LENGTH..mac_offset - 1];
        let mac = &payload[mac_offset..];

        // Find and consume the nonce we issued for this exchange
        let position = self
            .issued_nonces
            .iter()
            .position(|nonce| nonce[0] == nonce_id)
            .ok_or_else(|| {
                CcError::SecurityFailure(format!("unknown nonce id {:#04x}", nonce_id))
            })?;
        let receiver_nonce = self.issued_nonces.remove(position);

        let iv: Vec<u8> = sender_nonce
            .iter()
            .chain(receiver_nonce.iter())
            .copied()
            .collect();

        let expected_mac = {
            let mut auth_data = vec![
                cmd,
                sender.into(),
                receiver.into(),
                ciphertext.len() as u8,
            ];
            auth_data.extend_from_slice(ciphertext);
            compute_mac(&auth_data, &keys.auth_key, &iv)
        };
        if expected_mac != mac {
            return Err(CcError::SecurityFailure("MAC verification failed".into()));
        }

        let plaintext = decrypt_aes_ofb(ciphertext, &keys.enc_key, &iv);
        // Strip the sequencing byte
        Ok(plaintext[1..].to_vec())
    }
}

impl CommandClass for SecurityCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::Security as u8
    }

    fn name(&self) -> &'static str {
        "Security"
    }

    fn info(&self) -> &CcInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut CcInfo {
        &mut self.info
    }

    fn handle_msg(
        &mut self,
        ctx: &mut CcContext,
        cmd: u8,
        payload: &[u8],
        _instance: u8,
    ) -> Result<Disposition, CcError> {
        match cmd {
            SECURITY_NONCE_GET => Ok(Disposition::NonceGet),
            SECURITY_NONCE_REPORT => {
                let nonce: [u8; S0_NONCE_LENGTH] = payload
                    .get(..S0_NONCE_LENGTH)
                    .and_then(|bytes| bytes.try_into().ok())
                    .ok_or_else(|| CcError::Malformed("nonce report too short".into()))?;
                Ok(Disposition::NonceReport { nonce })
            }
            SECURITY_MESSAGE_ENCAP | SECURITY_MESSAGE_ENCAP_NONCE_GET => {
                let inner =
                    self.decrypt_message(cmd, payload, ctx.node_id, ctx.own_node_id)?;
                Ok(Disposition::SecureFrame { inner })
            }
            _ => Ok(Disposition::NotHandled),
        }
    }

    fn as_security_mut(&mut self) -> Option<&mut SecurityCc> {
        Some(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    const KEY: [u8; 16] = [
        0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a,
        0x0b, 0x0c,
    ];

    #[test]
    fn test_nonce_report_disposition() {
        let mut harness = Harness::new();
        let mut cc = SecurityCc::with_network_key(&KEY);

        let mut frame = vec![0x98, SECURITY_NONCE_REPORT];
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::NonceReport {
                nonce: [1, 2, 3, 4, 5, 6, 7, 8]
            }
        );
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        // Peer encrypts to us using a nonce we issued; both sides share
        // the key, so one instance can play both roles.
        let mut us = SecurityCc::with_network_key(&KEY);
        let peer = SecurityCc::with_network_key(&KEY);

        let report = us.make_nonce_report();
        let our_nonce: [u8; 8] = report.cc_bytes[2..].try_into().unwrap();

        // The peer (node 5) wraps a BinarySwitch report for us (node 1)
        let inner = vec![0x25, 0x03, 0xff];
        let encap =
            peer.encrypt_message(&inner, NodeId::new(5), NodeId::new(1), &our_nonce)
                .unwrap();

        let mut harness = Harness::new();
        let disposition = harness.handle(&mut us, &encap).unwrap();
        assert_eq!(disposition, Disposition::SecureFrame { inner });
    }

    #[test]
    fn test_tampered_mac_rejected() {
        let mut us = SecurityCc::with_network_key(&KEY);
        let peer = SecurityCc::with_network_key(&KEY);

        let report = us.make_nonce_report();
        let our_nonce: [u8; 8] = report.cc_bytes[2..].try_into().unwrap();

        let mut encap = peer
            .encrypt_message(&[0x25, 0x03, 0xff], NodeId::new(5), NodeId::new(1), &our_nonce)
            .unwrap();
        let tampered = encap.len() - 1;
        encap[tampered] ^= 0xff;

        let mut harness = Harness::new();
        assert!(matches!(
            harness.handle(&mut us, &encap),
            Err(CcError::SecurityFailure(_))
        ));
    }

    #[test]
    fn test_nonce_is_single_use() {
        let mut us = SecurityCc::with_network_key(&KEY);
        let peer = SecurityCc::with_network_key(&KEY);

        let report = us.make_nonce_report();
        let our_nonce: [u8; 8] = report.cc_bytes[2..].try_into().unwrap();
        let encap = peer
            .encrypt_message(&[0x25, 0x03, 0xff], NodeId::new(5), NodeId::new(1), &our_nonce)
            .unwrap();

        let mut harness = Harness::new();
        assert!(harness.handle(&mut us, &encap).is_ok());
        // Replay with the same nonce must fail
        assert!(matches!(
            harness.handle(&mut us, &encap),
            Err(CcError::SecurityFailure(_))
        ));
    }
}
