//! AES primitives for the S0 security scheme: OFB for payload encryption,
//! CBC-MAC for authentication, ECB for deriving the auth/encryption keys
//! from the network key.

use aes::cipher::{
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
    block_padding::ZeroPadding,
    generic_array::{GenericArray, typenum::U16},
};

type Aes128Ofb = ofb::Ofb<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

pub const S0_NONCE_LENGTH: usize = 8;

/// The constant plaintexts the S0 auth and encryption keys are derived from
const AUTH_KEY_BASE: [u8; 16] = [0x55; 16];
const ENC_KEY_BASE: [u8; 16] = [0xaa; 16];

pub fn encrypt_aes_ecb(plaintext: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = aes::Aes128::new(key.into());

    let mut block: GenericArray<u8, U16> = [0; 16].into();
    block.copy_from_slice(plaintext);

    cipher.encrypt_block(&mut block);

    block.to_vec()
}

pub fn encrypt_aes_ofb(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let mut cipher = <Aes128Ofb as KeyIvInit>::new(key.into(), iv.into());

    let mut buf = plaintext.to_vec();
    cipher.apply_keystream(&mut buf);

    buf
}

pub fn decrypt_aes_ofb(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    // OFB is symmetric
    encrypt_aes_ofb(ciphertext, key, iv)
}

/// Computes the 8-byte S0 authentication code over the given data
pub fn compute_mac(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let cipher = Aes128CbcEnc::new(key.into(), iv.into());
    let buf = cipher.encrypt_padded_vec_mut::<ZeroPadding>(plaintext);
    // The MAC is the first 8 bytes of the last 16 byte block
    buf[buf.len() - 16..][..8].to_vec()
}

/// The auth and encryption keys derived from the 16-byte network key
#[derive(Clone)]
pub struct NetworkKeys {
    pub auth_key: Vec<u8>,
    pub enc_key: Vec<u8>,
}

impl NetworkKeys {
    pub fn derive(network_key: &[u8; 16]) -> Self {
        Self {
            auth_key: encrypt_aes_ecb(&AUTH_KEY_BASE, network_key),
            enc_key: encrypt_aes_ecb(&ENC_KEY_BASE, network_key),
        }
    }
}

/// Generates a fresh random S0 nonce
pub fn random_nonce() -> [u8; S0_NONCE_LENGTH] {
    let mut nonce = [0u8; S0_NONCE_LENGTH];
    // The OS random source failing is not recoverable at this layer
    getrandom::getrandom(&mut nonce).expect("system random source unavailable");
    nonce
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: [u8; 16] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10,
    ];

    #[test]
    fn test_ofb_roundtrip() {
        let iv = [0x11u8; 16];
        let plaintext = hex::decode("00250100").unwrap();
        let ciphertext = encrypt_aes_ofb(&plaintext, &KEY, &iv);
        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt_aes_ofb(&ciphertext, &KEY, &iv), plaintext);
    }

    #[test]
    fn test_mac_is_deterministic() {
        let iv = [0u8; 16];
        let data = hex::decode("81000105deadbeef").unwrap();
        let mac1 = compute_mac(&data, &KEY, &iv);
        let mac2 = compute_mac(&data, &KEY, &iv);
        assert_eq!(mac1, mac2);
        assert_eq!(mac1.len(), 8);
    }

    #[test]
    fn test_derived_keys_differ() {
        let keys = NetworkKeys::derive(&KEY);
        assert_ne!(keys.auth_key, keys.enc_key);
        assert_eq!(keys.auth_key.len(), 16);
    }
}
