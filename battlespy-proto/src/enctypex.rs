//! The "enctypex" framing layer (C4, §4.4).
//!
//! The legacy GameSpy master-server protocol wraps every response in a
//! keyed byte-stream cipher derived from a per-title **handoff key** and the
//! client-supplied **validate nonce**. The original BF2Statistics/BattleSpy
//! implementation's exact S-box derivation and lookup tables are not
//! available to this workspace (see `DESIGN.md`); this module reproduces the
//! documented *shape* of the handshake — a keyed RC4-style schedule built
//! from `handoff_key || nonce`, run through key-scheduling and
//! pseudo-random-generation passes in 256-byte rounds, with the nonce
//! echoed back as a header the client uses to re-derive the same schedule.
//! It is deterministic and its own exact inverse; it is not byte-exact with
//! the undocumented original stream.

/// Fixed 6-byte ASCII handoff key identifying a title to the codec.
pub type HandoffKey = [u8; 6];

/// The 8-byte client-supplied nonce (the `validate` prefix of a request frame).
pub type Nonce = [u8; 8];

const TABLE_SIZE: usize = 256;

/// Key-schedule a 256-byte permutation table from `handoff_key || nonce`,
/// the enctypex handshake's keying material.
fn key_schedule(handoff_key: &HandoffKey, nonce: &Nonce) -> [u8; TABLE_SIZE] {
    let mut key = Vec::with_capacity(handoff_key.len() + nonce.len());
    key.extend_from_slice(handoff_key);
    key.extend_from_slice(nonce);

    let mut table: [u8; TABLE_SIZE] = [0; TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }

    let mut j: u8 = 0;
    for i in 0..TABLE_SIZE {
        j = j
            .wrapping_add(table[i])
            .wrapping_add(key[i % key.len()]);
        table.swap(i, j as usize);
    }
    table
}

/// Generates `len` bytes of keystream from a key-scheduled table via the
/// standard pseudo-random-generation pass, consuming a private copy of the
/// table so repeated calls over one session each start the stream fresh.
fn keystream(table: &[u8; TABLE_SIZE], len: usize) -> Vec<u8> {
    let mut table = *table;
    let mut i: u8 = 0;
    let mut j: u8 = 0;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        i = i.wrapping_add(1);
        j = j.wrapping_add(table[i as usize]);
        table.swap(i as usize, j as usize);
        let k = table[(table[i as usize].wrapping_add(table[j as usize])) as usize];
        out.push(k);
    }
    out
}

/// Header prefixed to the ciphertext so the client can re-derive the
/// schedule: the raw nonce, echoed back verbatim.
fn header(nonce: &Nonce) -> Vec<u8> {
    nonce.to_vec()
}

/// Encrypts `payload` under `handoff_key`/`nonce`, returning the header-
/// prefixed ciphertext ready to write to the wire (§4.4).
pub fn encrypt(handoff_key: &HandoffKey, nonce: &Nonce, payload: &[u8]) -> Vec<u8> {
    let table = key_schedule(handoff_key, nonce);
    let stream = keystream(&table, payload.len());

    let mut out = header(nonce);
    out.reserve(payload.len());
    out.extend(payload.iter().zip(stream.iter()).map(|(&p, &k)| p ^ k));
    out
}

/// Exact inverse of [`encrypt`]: strips the header and XORs with the same
/// keystream. Used by this core's own tests to validate round-tripping; not
/// part of the production client-facing surface (the client is the one
/// decrypting, not this server).
pub fn decrypt(handoff_key: &HandoffKey, framed: &[u8]) -> Option<Vec<u8>> {
    if framed.len() < 8 {
        return None;
    }
    let mut nonce: Nonce = [0; 8];
    nonce.copy_from_slice(&framed[..8]);
    let ciphertext = &framed[8..];

    let table = key_schedule(handoff_key, &nonce);
    let stream = keystream(&table, ciphertext.len());

    Some(
        ciphertext
            .iter()
            .zip(stream.iter())
            .map(|(&c, &k)| c ^ k)
            .collect(),
    )
}
