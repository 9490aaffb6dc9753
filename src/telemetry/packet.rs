//! Binary state packet codec
//!
//! Wire layout (all little-endian, two's complement):
//! - 12-byte header: magic, version, tick
//! - 18 `i32` fields (72 bytes): health, armor, ammo[4], weapon, x, y, z,
//!   angle, mom_x, mom_y, level, kills, items, secrets, enemy_count
//! - 4-byte reserved pad
//! - enemy table at offset 88, 20 bytes per entry

use bytes::{Buf, BufMut, BytesMut};

/// Packet tag: ASCII "DOOM" read as a little-endian u32
pub const PACKET_MAGIC: u32 = u32::from_le_bytes(*b"DOOM");

/// Version written by `encode`
pub const PROTOCOL_VERSION: u32 = 1;

/// Header plus player block plus reserved pad
pub const MIN_PACKET_LEN: usize = 88;

/// Size of one enemy entry (5 x i32)
pub const ENEMY_ENTRY_LEN: usize = 20;

/// Enemy entries beyond this are never read
pub const MAX_ENEMIES: usize = 16;

/// Number of ammo pools (bullets, shells, cells, rockets)
pub const AMMO_TYPES: usize = 4;

/// Telemetry decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid packet magic {0:#010x}")]
    InvalidMagic(u32),

    #[error("packet too short: {len} bytes (need at least {MIN_PACKET_LEN})")]
    ShortPacket { len: usize },
}

/// One visible enemy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Enemy {
    pub kind: i32,
    pub health: i32,
    /// 16.16 fixed point
    pub x: i32,
    /// 16.16 fixed point
    pub y: i32,
    /// 16.16 fixed point, never negative after decode
    pub distance: i32,
}

/// World state for one simulation tick
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameState {
    pub tick: u32,
    pub health: i32,
    pub armor: i32,
    /// bullets, shells, cells, rockets
    pub ammo: [i32; AMMO_TYPES],
    pub weapon: i32,
    /// 16.16 fixed point
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Binary angle: 0..2^32 maps to 0..360 degrees
    pub angle: u32,
    pub momentum_x: i32,
    pub momentum_y: i32,
    pub level: i32,
    pub kills: i32,
    pub items: i32,
    pub secrets: i32,
    /// As reported by the simulation; may exceed `enemies.len()`
    pub enemy_count: i32,
    pub enemies: Vec<Enemy>,
}

impl GameState {
    /// Whether the player is still alive
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// Enemy entries a packet carries for a declared `enemy_count`
fn enemy_table_len(enemy_count: i32) -> usize {
    usize::try_from(enemy_count.max(0))
        .unwrap_or(0)
        .min(MAX_ENEMIES)
}

/// Decode a telemetry datagram.
///
/// A declared enemy table that runs past the end of the buffer is truncated
/// to the entries that fit; it does not fail the decode.
pub fn decode(packet: &[u8]) -> Result<GameState, DecodeError> {
    if packet.len() < MIN_PACKET_LEN {
        return Err(DecodeError::ShortPacket { len: packet.len() });
    }

    let mut buf = packet;

    let magic = buf.get_u32_le();
    if magic != PACKET_MAGIC {
        return Err(DecodeError::InvalidMagic(magic));
    }
    let version = buf.get_u32_le();
    if version != PROTOCOL_VERSION {
        tracing::trace!(version, "Unexpected telemetry packet version");
    }
    let tick = buf.get_u32_le();

    let health = buf.get_i32_le().max(0);
    let armor = buf.get_i32_le().max(0);
    let mut ammo = [0i32; AMMO_TYPES];
    for slot in ammo.iter_mut() {
        *slot = buf.get_i32_le();
    }
    let weapon = buf.get_i32_le();
    let x = buf.get_i32_le();
    let y = buf.get_i32_le();
    let z = buf.get_i32_le();
    let angle = buf.get_i32_le() as u32;
    let momentum_x = buf.get_i32_le();
    let momentum_y = buf.get_i32_le();
    let level = buf.get_i32_le();
    let kills = buf.get_i32_le();
    let items = buf.get_i32_le();
    let secrets = buf.get_i32_le();
    let enemy_count = buf.get_i32_le();

    // Reserved alignment pad
    buf.advance(4);

    let declared = enemy_table_len(enemy_count);
    let available = buf.remaining() / ENEMY_ENTRY_LEN;
    if available < declared {
        tracing::debug!(
            tick,
            declared,
            available,
            "Enemy table truncated by packet length"
        );
    }

    let enemies = (0..declared.min(available))
        .map(|_| Enemy {
            kind: buf.get_i32_le(),
            health: buf.get_i32_le(),
            x: buf.get_i32_le(),
            y: buf.get_i32_le(),
            distance: buf.get_i32_le().max(0),
        })
        .collect();

    Ok(GameState {
        tick,
        health,
        armor,
        ammo,
        weapon,
        x,
        y,
        z,
        angle,
        momentum_x,
        momentum_y,
        level,
        kills,
        items,
        secrets,
        enemy_count,
        enemies,
    })
}

/// Encode a state into a telemetry datagram (inverse of [`decode`]).
///
/// At most [`MAX_ENEMIES`] entries are written.
#[cfg_attr(not(test), allow(dead_code))]
pub fn encode(state: &GameState) -> Vec<u8> {
    let enemies = &state.enemies[..state.enemies.len().min(MAX_ENEMIES)];
    let mut buf = BytesMut::with_capacity(MIN_PACKET_LEN + enemies.len() * ENEMY_ENTRY_LEN);

    buf.put_u32_le(PACKET_MAGIC);
    buf.put_u32_le(PROTOCOL_VERSION);
    buf.put_u32_le(state.tick);

    buf.put_i32_le(state.health);
    buf.put_i32_le(state.armor);
    for ammo in state.ammo {
        buf.put_i32_le(ammo);
    }
    buf.put_i32_le(state.weapon);
    buf.put_i32_le(state.x);
    buf.put_i32_le(state.y);
    buf.put_i32_le(state.z);
    buf.put_i32_le(state.angle as i32);
    buf.put_i32_le(state.momentum_x);
    buf.put_i32_le(state.momentum_y);
    buf.put_i32_le(state.level);
    buf.put_i32_le(state.kills);
    buf.put_i32_le(state.items);
    buf.put_i32_le(state.secrets);
    buf.put_i32_le(state.enemy_count);
    buf.put_u32_le(0);

    for enemy in enemies {
        buf.put_i32_le(enemy.kind);
        buf.put_i32_le(enemy.health);
        buf.put_i32_le(enemy.x);
        buf.put_i32_le(enemy.y);
        buf.put_i32_le(enemy.distance);
    }

    buf.to_vec()
}
