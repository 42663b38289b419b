//! Fixed little-endian wire types for photon and count messages.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded
//! with `from_le`; doubles travel as the LE form of their IEEE-754 bit
//! pattern. Records are `#[repr(C)]` and `bytemuck::Pod`-safe.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

use crate::photon::Photon;
use crate::transport_error::TransportError;

const FLAG_CENSUS: u32 = 1 << 0;
const FLAG_ALIVE: u32 = 1 << 1;

/// One photon record on the wire: position, direction, energies, the
/// remaining flight distance, the global cell id and state flags.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WirePhoton {
    pos_le: [u64; 3],
    dir_le: [u64; 3],
    e_le: u64,
    e0_le: u64,
    remaining_le: u64,
    cell_le: u32,
    flags_le: u32,
}

impl WirePhoton {
    pub const SIZE: usize = 80;

    pub fn encode(p: &Photon) -> Self {
        let f64_le = |x: f64| x.to_bits().to_le();
        let pos = p.position();
        let dir = p.direction();
        let mut flags = 0u32;
        if p.census_flag() {
            flags |= FLAG_CENSUS;
        }
        if p.alive() {
            flags |= FLAG_ALIVE;
        }
        Self {
            pos_le: [f64_le(pos[0]), f64_le(pos[1]), f64_le(pos[2])],
            dir_le: [f64_le(dir[0]), f64_le(dir[1]), f64_le(dir[2])],
            e_le: f64_le(p.energy()),
            e0_le: f64_le(p.birth_energy()),
            remaining_le: f64_le(p.distance_remaining()),
            cell_le: p.cell().to_le(),
            flags_le: flags.to_le(),
        }
    }

    pub fn decode(&self) -> Photon {
        let f64_de = |x: u64| f64::from_bits(u64::from_le(x));
        let flags = u32::from_le(self.flags_le);
        Photon::from_wire_parts(
            [
                f64_de(self.pos_le[0]),
                f64_de(self.pos_le[1]),
                f64_de(self.pos_le[2]),
            ],
            [
                f64_de(self.dir_le[0]),
                f64_de(self.dir_le[1]),
                f64_de(self.dir_le[2]),
            ],
            u32::from_le(self.cell_le),
            f64_de(self.e_le),
            f64_de(self.e0_le),
            f64_de(self.remaining_le),
            flags & FLAG_CENSUS != 0,
            flags & FLAG_ALIVE != 0,
        )
    }
}

/// Serialize a photon batch for one point-to-point message.
pub fn encode_photons(photons: &[Photon]) -> Vec<u8> {
    let records: Vec<WirePhoton> = photons.iter().map(WirePhoton::encode).collect();
    bytemuck::cast_slice(&records).to_vec()
}

/// Decode a photon batch; the empty message decodes to an empty batch.
pub fn decode_photons(bytes: &[u8]) -> Result<Vec<Photon>, TransportError> {
    if bytes.len() % WirePhoton::SIZE != 0 {
        return Err(TransportError::MalformedPhotonMessage { len: bytes.len() });
    }
    let mut records = vec![WirePhoton::zeroed(); bytes.len() / WirePhoton::SIZE];
    bytemuck::cast_slice_mut::<WirePhoton, u8>(&mut records).copy_from_slice(bytes);
    Ok(records.iter().map(WirePhoton::decode).collect())
}

/// Serialize one completion count.
pub fn encode_count(count: u64) -> [u8; 8] {
    count.to_le_bytes()
}

/// Decode one completion count.
pub fn decode_count(bytes: &[u8]) -> Result<u64, TransportError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TransportError::MalformedCountMessage { len: bytes.len() })?;
    Ok(u64::from_le_bytes(arr))
}

const _: () = {
    assert!(size_of::<WirePhoton>() == WirePhoton::SIZE);
    assert!(align_of::<WirePhoton>() == 8);
};
