use aes::cipher::{inout::InOutBuf, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128Cfb8Enc = cfb8::Encryptor<aes::Aes128>;
type Aes128Cfb8Dec = cfb8::Decryptor<aes::Aes128>;

/// AES-128 in CFB8 mode. The shared secret is both key and initial vector, and the
/// feedback register keeps running across every packet of the session.
pub struct Encrypter {
    cipher: Aes128Cfb8Enc,
}

impl Encrypter {
    pub fn new(key: &[u8; 16]) -> Self {
        Self { cipher: Aes128Cfb8Enc::new(key.into(), key.into()) }
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        let (blocks, _) = InOutBuf::from(data).into_chunks();
        self.cipher.encrypt_blocks_inout_mut(blocks);
    }
}

pub struct Decrypter {
    cipher: Aes128Cfb8Dec,
}

impl Decrypter {
    pub fn new(key: &[u8; 16]) -> Self {
        Self { cipher: Aes128Cfb8Dec::new(key.into(), key.into()) }
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        let (blocks, _) = InOutBuf::from(data).into_chunks();
        self.cipher.decrypt_blocks_inout_mut(blocks);
    }
}
