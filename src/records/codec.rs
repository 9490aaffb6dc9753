//! Fixed-width record codec
//!
//! Telemetry goes out as STATE, PLAYER, AMMO and one ENEMY record per
//! visible enemy. Commands come back as COMMAND records. World coordinates
//! travel as whole map units (`raw >> 16`), so the low 16 bits are lost on
//! the way through.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::command::types::{CommandAction, CommandRecord, Direction, REASON_LEN};
use crate::telemetry::packet::{GameState, AMMO_TYPES, MAX_ENEMIES};

use super::encoding::{Encoding, TextEncoding};
use super::fields::{
    from_map_units, optionally_signed, signed, text, to_map_units, unsigned, RecordReader,
    RecordWriter, RECORD_LEN,
};

/// Record decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("unknown record type {0:?}")]
    UnknownRecordType(String),

    /// Non-fatal: callers substitute 0 for the field
    #[error("field {field} is not numeric: {raw:?}")]
    FieldParse { field: &'static str, raw: String },
}

/// Leading type tag of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    State,
    Player,
    Ammo,
    Enemy,
    Command,
}

impl RecordKind {
    /// Tag written on encode
    pub fn tag(self) -> &'static str {
        match self {
            Self::State => "STATE",
            Self::Player => "PLAYER",
            Self::Ammo => "AMMO",
            Self::Enemy => "ENEMY",
            Self::Command => "COMMAND",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, RecordError> {
        match tag {
            "STATE" => Ok(Self::State),
            "PLAYER" => Ok(Self::Player),
            "AMMO" => Ok(Self::Ammo),
            "ENEMY" | "ENTITY" => Ok(Self::Enemy),
            "COMMAND" => Ok(Self::Command),
            other => Err(RecordError::UnknownRecordType(other.to_string())),
        }
    }
}

/// STATE header record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub tick: u32,
    pub level: i32,
    /// `None` if the date field is blank or malformed
    pub date: Option<NaiveDate>,
}

/// PLAYER record; coordinates are fixed point rebuilt from map units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub angle_degrees: i32,
    pub health: i32,
    pub armor: i32,
    pub alive: bool,
    pub flags: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmoRecord {
    pub ammo: [i32; AMMO_TYPES],
    pub weapon: i32,
}

/// ENEMY/ENTITY record; coordinates are fixed point rebuilt from map units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyRecord {
    pub kind: i32,
    pub health: i32,
    pub x: i32,
    pub y: i32,
    pub distance: i32,
    /// 0 when unknown
    pub angle_to: i32,
    pub flags: String,
}

/// Any decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    State(StateRecord),
    Player(PlayerRecord),
    Ammo(AmmoRecord),
    Enemy(EnemyRecord),
    Command(CommandRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::State(_) => RecordKind::State,
            Self::Player(_) => RecordKind::Player,
            Self::Ammo(_) => RecordKind::Ammo,
            Self::Enemy(_) => RecordKind::Enemy,
            Self::Command(_) => RecordKind::Command,
        }
    }
}

/// Binary angle (0..2^32) to whole degrees (0..360)
pub fn angle_to_degrees(angle: u32) -> i32 {
    ((u64::from(angle) * 360) >> 32) as i32
}

// Field offsets, 0-based
const STATE_TICK: usize = 8;
const STATE_LEVEL: usize = 16;
const STATE_DATE: usize = 18;

const PLAYER_X: usize = 8;
const PLAYER_Y: usize = 16;
const PLAYER_Z: usize = 24;
const PLAYER_ANGLE: usize = 32;
const PLAYER_HEALTH: usize = 36;
const PLAYER_ARMOR: usize = 39;
const PLAYER_STATUS: usize = 42;
const PLAYER_FLAGS: usize = 43;

const AMMO_FIRST: usize = 8;
const AMMO_WEAPON: usize = 24;

const ENEMY_TYPE: usize = 8;
const ENEMY_HEALTH: usize = 10;
const ENEMY_X: usize = 13;
const ENEMY_Y: usize = 21;
const ENEMY_DISTANCE: usize = 29;
const ENEMY_ANGLE: usize = 34;
const ENEMY_FLAGS: usize = 37;

const CMD_ACTION: usize = 8;
const CMD_DIRECTION: usize = 16;
const CMD_VALUE: usize = 24;
const CMD_PRIORITY: usize = 28;
const CMD_REASON: usize = 29;

const FLAGS_LEN: usize = 8;

/// Encodes telemetry to records and decodes peer records, in one encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec<E = Encoding> {
    encoding: E,
}

impl<E: TextEncoding> RecordCodec<E> {
    pub fn new(encoding: E) -> Self {
        Self { encoding }
    }

    /// STATE, PLAYER, AMMO, then up to 16 ENEMY records, as text
    pub fn encode_game_state(&self, state: &GameState, date: NaiveDate) -> Vec<String> {
        let mut records = Vec::with_capacity(3 + state.enemies.len().min(MAX_ENEMIES));
        records.push(encode_state(state, date));
        records.push(encode_player(state));
        records.push(encode_ammo(state));
        records.extend(
            state
                .enemies
                .iter()
                .take(MAX_ENEMIES)
                .map(|enemy| {
                    encode_enemy(&EnemyRecord {
                        kind: enemy.kind,
                        health: enemy.health,
                        x: enemy.x,
                        y: enemy.y,
                        distance: enemy.distance,
                        angle_to: 0,
                        flags: String::new(),
                    })
                }),
        );
        records
    }

    /// Encoded upload buffer: records back to back, no separators
    pub fn to_bytes(&self, records: &[String]) -> Vec<u8> {
        let mut out = Vec::with_capacity(records.len() * RECORD_LEN);
        for record in records {
            out.extend(self.encoding.to_bytes(record));
        }
        out
    }

    /// Decode one record; input shorter than 80 bytes is space-padded
    pub fn decode(&self, bytes: &[u8]) -> Result<Record, RecordError> {
        decode_text(&self.encoding.from_bytes(bytes))
    }

    /// Split a download buffer into 80-byte records and decode each.
    ///
    /// Bad records are logged and skipped. Blank records are ignored.
    pub fn decode_batch(&self, buf: &[u8]) -> Vec<Record> {
        buf.chunks(RECORD_LEN)
            .enumerate()
            .filter_map(|(index, chunk)| {
                let line = self.encoding.from_bytes(chunk);
                if line.trim().is_empty() {
                    return None;
                }
                match decode_text(&line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping undecodable record");
                        None
                    }
                }
            })
            .collect()
    }

    /// COMMAND records from a download buffer, in file order
    pub fn decode_commands(&self, buf: &[u8]) -> Vec<CommandRecord> {
        self.decode_batch(buf)
            .into_iter()
            .filter_map(|record| match record {
                Record::Command(cmd) => Some(cmd),
                other => {
                    debug!(kind = ?other.kind(), "Ignoring non-command record from peer");
                    None
                }
            })
            .collect()
    }

    /// Encode a single COMMAND record into bytes
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn encode_command(&self, cmd: &CommandRecord) -> Vec<u8> {
        self.encoding.to_bytes(&encode_command(cmd))
    }
}

pub fn encode_state(state: &GameState, date: NaiveDate) -> String {
    let mut w = RecordWriter::new(RecordKind::State.tag());
    w.push(&unsigned(i64::from(state.tick), 8))
        .push(&unsigned(i64::from(state.level), 2))
        .push(&date.format("%Y%m%d").to_string());
    w.finish()
}

pub fn encode_player(state: &GameState) -> String {
    let status = if state.is_alive() { "A" } else { "D" };
    let mut w = RecordWriter::new(RecordKind::Player.tag());
    w.push(&signed(i64::from(to_map_units(state.x)), 8))
        .push(&signed(i64::from(to_map_units(state.y)), 8))
        .push(&signed(i64::from(to_map_units(state.z)), 8))
        .push(&signed(i64::from(angle_to_degrees(state.angle)), 4))
        .push(&unsigned(i64::from(state.health), 3))
        .push(&unsigned(i64::from(state.armor), 3))
        .push(status)
        .push(&text("", FLAGS_LEN));
    w.finish()
}

pub fn encode_ammo(state: &GameState) -> String {
    let mut w = RecordWriter::new(RecordKind::Ammo.tag());
    for ammo in state.ammo {
        w.push(&unsigned(i64::from(ammo), 4));
    }
    w.push(&unsigned(i64::from(state.weapon), 1));
    w.finish()
}

pub fn encode_enemy(enemy: &EnemyRecord) -> String {
    let mut w = RecordWriter::new(RecordKind::Enemy.tag());
    w.push(&unsigned(i64::from(enemy.kind), 2))
        .push(&unsigned(i64::from(enemy.health), 3))
        .push(&signed(i64::from(to_map_units(enemy.x)), 8))
        .push(&signed(i64::from(to_map_units(enemy.y)), 8))
        .push(&unsigned(i64::from(to_map_units(enemy.distance)), 5))
        .push(&signed(i64::from(enemy.angle_to), 3))
        .push(&text(&enemy.flags, FLAGS_LEN));
    w.finish()
}

pub fn encode_command(cmd: &CommandRecord) -> String {
    let mut w = RecordWriter::new(RecordKind::Command.tag());
    w.push(&text(cmd.action.token(), 8))
        .push(&text(cmd.direction.token(), 8))
        .push(&optionally_signed(i64::from(cmd.value), 4))
        .push(&unsigned(i64::from(cmd.priority), 1))
        .push(&text(&cmd.reason, REASON_LEN));
    w.finish()
}

/// Decode one record already converted to text
pub fn decode_text(line: &str) -> Result<Record, RecordError> {
    let r = RecordReader::new(line);
    let kind = RecordKind::from_tag(&r.tag())?;

    let record = match kind {
        RecordKind::State => Record::State(StateRecord {
            tick: u32::try_from(r.lenient("tick", STATE_TICK, 8)).unwrap_or(0),
            level: r.lenient_i32("level", STATE_LEVEL, 2),
            date: NaiveDate::parse_from_str(&r.raw(STATE_DATE, 8), "%Y%m%d").ok(),
        }),
        RecordKind::Player => Record::Player(PlayerRecord {
            x: from_map_units(r.lenient_i32("x", PLAYER_X, 8)),
            y: from_map_units(r.lenient_i32("y", PLAYER_Y, 8)),
            z: from_map_units(r.lenient_i32("z", PLAYER_Z, 8)),
            angle_degrees: r.lenient_i32("angle", PLAYER_ANGLE, 4),
            health: r.lenient_i32("health", PLAYER_HEALTH, 3),
            armor: r.lenient_i32("armor", PLAYER_ARMOR, 3),
            alive: r.raw(PLAYER_STATUS, 1) == "A",
            flags: r.text(PLAYER_FLAGS, FLAGS_LEN),
        }),
        RecordKind::Ammo => {
            let mut ammo = [0i32; AMMO_TYPES];
            for (i, slot) in ammo.iter_mut().enumerate() {
                *slot = r.lenient_i32("ammo", AMMO_FIRST + i * 4, 4);
            }
            Record::Ammo(AmmoRecord {
                ammo,
                weapon: r.lenient_i32("weapon", AMMO_WEAPON, 1),
            })
        }
        RecordKind::Enemy => Record::Enemy(EnemyRecord {
            kind: r.lenient_i32("enemy type", ENEMY_TYPE, 2),
            health: r.lenient_i32("enemy health", ENEMY_HEALTH, 3),
            x: from_map_units(r.lenient_i32("enemy x", ENEMY_X, 8)),
            y: from_map_units(r.lenient_i32("enemy y", ENEMY_Y, 8)),
            distance: from_map_units(r.lenient_i32("distance", ENEMY_DISTANCE, 5)),
            angle_to: r.lenient_i32("angle to", ENEMY_ANGLE, 3),
            flags: r.text(ENEMY_FLAGS, FLAGS_LEN),
        }),
        RecordKind::Command => {
            let token = r.text(CMD_ACTION, 8);
            let action = CommandAction::from_token(&token);
            if action == CommandAction::Unknown {
                debug!(token = %token, "Unrecognized command action");
            }
            Record::Command(CommandRecord {
                action,
                direction: Direction::from_token(&r.text(CMD_DIRECTION, 8)),
                value: r.lenient_i32("value", CMD_VALUE, 4),
                priority: u8::try_from(r.lenient("priority", CMD_PRIORITY, 1)).unwrap_or(0),
                reason: r.text(CMD_REASON, REASON_LEN),
            })
        }
    };

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::packet::Enemy;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn sample_state() -> GameState {
        GameState {
            tick: 1234,
            health: 87,
            armor: 25,
            ammo: [50, 8, 0, 2],
            weapon: 2,
            x: (-1088 << 16) + 0x4000,
            y: 3520 << 16,
            z: 16 << 16,
            angle: 0x4000_0000,
            level: 3,
            enemy_count: 1,
            enemies: vec![Enemy {
                kind: 9,
                health: 20,
                x: (100 << 16) + 5,
                y: -40 << 16,
                distance: (512 << 16) + 77,
            }],
            ..GameState::default()
        }
    }

    #[test]
    fn encodes_expected_layouts() {
        let records = RecordCodec::new(Encoding::Ascii).encode_game_state(&sample_state(), date());
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.len() == RECORD_LEN));

        assert_eq!(&records[0][..26], "STATE   000012340320261019");
        assert_eq!(
            &records[1][..51],
            "PLAYER  -0001088+0003520+0000016+090087025A        "
        );
        assert_eq!(&records[2][..25], "AMMO    00500008000000022");
        assert_eq!(&records[3][..45], "ENEMY   09020+0000100-000004000512+00        ");
    }

    #[test]
    fn decodes_reference_command_record() {
        let codec = RecordCodec::new(Encoding::Ascii);
        let line = format!("{:<80}", "COMMAND MOVE    FORWARD 00201ENEMY APPROACHING");
        let record = codec.decode(line.as_bytes()).expect("decodes");
        assert_eq!(
            record,
            Record::Command(CommandRecord {
                action: CommandAction::Move,
                direction: Direction::Forward,
                value: 20,
                priority: 1,
                reason: "ENEMY APPROACHING".to_string(),
            })
        );
    }

    #[test]
    fn telemetry_records_round_trip_except_sub_unit_precision() {
        let state = sample_state();
        let codec = RecordCodec::new(Encoding::Ebcdic);
        let records = codec.encode_game_state(&state, date());
        let bytes = codec.to_bytes(&records);
        assert_eq!(bytes.len(), records.len() * RECORD_LEN);

        let decoded = codec.decode_batch(&bytes);
        assert_eq!(
            decoded,
            vec![
                Record::State(StateRecord {
                    tick: 1234,
                    level: 3,
                    date: Some(date()),
                }),
                Record::Player(PlayerRecord {
                    x: -1088 << 16,
                    y: 3520 << 16,
                    z: 16 << 16,
                    angle_degrees: 90,
                    health: 87,
                    armor: 25,
                    alive: true,
                    flags: String::new(),
                }),
                Record::Ammo(AmmoRecord {
                    ammo: [50, 8, 0, 2],
                    weapon: 2,
                }),
                Record::Enemy(EnemyRecord {
                    kind: 9,
                    health: 20,
                    x: 100 << 16,
                    y: -40 << 16,
                    distance: 512 << 16,
                    angle_to: 0,
                    flags: String::new(),
                }),
            ]
        );
    }

    #[test]
    fn command_records_round_trip() {
        let codec = RecordCodec::new(Encoding::Ebcdic);
        let commands = vec![
            CommandRecord::new(CommandAction::Turn, Direction::Left, 90)
                .with_priority(3)
                .with_reason("SEARCHING"),
            CommandRecord::new(CommandAction::Wait, Direction::None, -5),
            CommandRecord::new(CommandAction::Weapon, Direction::None, 4).with_priority(9),
        ];
        let buf: Vec<u8> = commands
            .iter()
            .flat_map(|cmd| codec.encode_command(cmd))
            .collect();
        assert_eq!(codec.decode_commands(&buf), commands);
    }

    #[test]
    fn rejects_unknown_record_type() {
        let codec = RecordCodec::new(Encoding::Ascii);
        assert_eq!(
            codec.decode(b"GARBAGE 0001"),
            Err(RecordError::UnknownRecordType("GARBAGE".to_string()))
        );
    }

    #[test]
    fn entity_tag_is_accepted() {
        let record = decode_text("ENTITY  01100+0000001+0000002000030").expect("decodes");
        assert_eq!(record.kind(), RecordKind::Enemy);
    }

    #[test]
    fn malformed_numbers_resolve_to_zero() {
        let line = format!("{:<8}{:<8}{:<8}{:<4} Z", "COMMAND", "SHOOT", "", "XX");
        let record = decode_text(&line).expect("decodes");
        let Record::Command(cmd) = record else {
            panic!("expected command, got {record:?}");
        };
        assert_eq!(cmd.action, CommandAction::Shoot);
        assert_eq!(cmd.direction, Direction::None);
        assert_eq!(cmd.value, 0);
        assert_eq!(cmd.priority, 0);
        assert_eq!(cmd.reason, "Z");
    }

    #[test]
    fn unknown_action_decodes_as_unknown() {
        let record = decode_text("COMMAND JUMP    FORWARD 0001").expect("decodes");
        assert!(matches!(
            record,
            Record::Command(CommandRecord { action: CommandAction::Unknown, .. })
        ));
    }

    #[test]
    fn batch_skips_bad_and_blank_records() {
        let codec = RecordCodec::new(Encoding::Ascii);
        let mut buf = Vec::new();
        buf.extend(format!("{:<80}", "NOISE").bytes());
        buf.extend(" ".repeat(80).bytes());
        buf.extend(format!("{:<80}", "COMMAND USE").bytes());
        buf.extend(format!("{:<8}{:<8}{:<8}0050", "COMMAND", "WAIT", "").bytes());

        let commands = codec.decode_commands(&buf);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].action, CommandAction::Use);
        assert_eq!(commands[1].action, CommandAction::Wait);
        assert_eq!(commands[1].value, 50);
    }

    #[test]
    fn dead_player_and_oversized_values_stay_in_width() {
        let mut state = sample_state();
        state.health = 0;
        state.tick = u32::MAX;
        state.ammo[0] = 12_345;
        let records = RecordCodec::new(Encoding::Ascii).encode_game_state(&state, date());
        assert!(records.iter().all(|r| r.len() == RECORD_LEN));
        assert_eq!(&records[0][8..16], "99999999");
        assert_eq!(&records[1][42..43], "D");
        assert_eq!(&records[2][8..12], "9999");
    }

    #[test]
    fn degrees_cover_full_circle() {
        assert_eq!(angle_to_degrees(0), 0);
        assert_eq!(angle_to_degrees(0x8000_0000), 180);
        assert_eq!(angle_to_degrees(u32::MAX), 359);
    }
}
