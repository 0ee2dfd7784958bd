//! Entity code generation and validation
//!
//! Codes have the shape `PREFIX-TIME-SEQCHECKSUM-ENTITY-YY`: a monotonic
//! time fragment, a worker/sequence fragment, a keyed fragment derived from
//! the entity id, and a keyed checksum character. They are minted without
//! any coordination service and re-validated offline from the code text
//! alone plus the signing secret.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;
use thiserror::Error;

use crate::codes::worker_id::WorkerIdSource;

type HmacSha256 = Hmac<Sha256>;

/// The 32-symbol code alphabet. I, L, O and U are excluded as visually
/// ambiguous; the rest sort in ASCII order so fixed-width fragments compare
/// lexicographically the same as numerically.
pub const CODE_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// 2024-01-01T00:00:00Z. Fragment values are seconds since this instant.
const CODE_EPOCH_SECS: u64 = 1_704_067_200;

const TIME_CHARS: usize = 5;
const SEQUENCE_CHARS: usize = 4;
const ENTITY_CHARS: usize = 4;

/// Five alphabet chars carry 25 bits; the time value wraps past this.
const TIME_MASK: u64 = (1 << (TIME_CHARS * 5)) - 1;

const SEQUENCE_BITS: u32 = 8;
const SEQUENCE_MAX: u16 = (1 << SEQUENCE_BITS) - 1;

/// Entity fragment used when the caller supplies no entity id.
const ENTITY_FILLER: &str = "0000";

const CODE_PATTERN: &str =
    r"^([A-Z]{1,4})-([0-9A-HJ-KM-NP-TV-Z]{5})-([0-9A-HJ-KM-NP-TV-Z]{5})-([0-9A-HJ-KM-NP-TV-Z]{4})-([0-9]{2})$";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("code does not match the expected format")]
    MalformedCode,
    #[error("code checksum mismatch")]
    ChecksumMismatch,
}

/// Components of a code that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCode {
    pub prefix: String,
    pub time_fragment: String,
    pub sequence_fragment: String,
    pub entity_fragment: String,
    pub checksum: char,
    pub year: String,
}

struct GeneratorState {
    last_secs: u64,
    sequence: u16,
    entity_cache: HashMap<String, String>,
}

/// Mints and validates entity codes.
///
/// One instance per process. The sequence counter and last-seen timestamp
/// live behind a mutex so concurrent callers advance them atomically; the
/// entity fragment cache shares the same lock.
pub struct CodeGenerator {
    secret: Vec<u8>,
    worker_id: u16,
    pattern: Regex,
    state: Mutex<GeneratorState>,
}

impl CodeGenerator {
    pub fn new(secret: &str, worker_ids: &dyn WorkerIdSource) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            worker_id: worker_ids.worker_id(),
            pattern: Regex::new(CODE_PATTERN).expect("hard-coded pattern compiles"),
            state: Mutex::new(GeneratorState {
                last_secs: 0,
                sequence: 0,
                entity_cache: HashMap::new(),
            }),
        }
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Mint a new code. Never fails; the only blocking condition is the
    /// bounded wait when the per-second sequence budget is exhausted.
    pub fn generate(&self, entity_id: Option<&str>, prefix: &str) -> String {
        let prefix = sanitize_prefix(prefix);

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            // A poisoning panic cannot leave the counters half-written.
            Err(poisoned) => poisoned.into_inner(),
        };
        let seconds = Self::advance_clock(&mut state);
        let sequence = state.sequence;
        let entity_fragment = match entity_id {
            Some(id) if !id.is_empty() => self.entity_fragment_cached(&mut state, id),
            _ => ENTITY_FILLER.to_string(),
        };
        drop(state);

        let time_fragment = encode_fragment(
            seconds.saturating_sub(CODE_EPOCH_SECS) & TIME_MASK,
            TIME_CHARS,
        );
        let sequence_value = ((self.worker_id as u64) << SEQUENCE_BITS) | sequence as u64;
        let sequence_fragment = encode_fragment(sequence_value, SEQUENCE_CHARS);
        let checksum = self.checksum_char(&time_fragment, &sequence_fragment, &entity_fragment);
        let year = Utc::now().year() % 100;

        format!(
            "{}-{}-{}{}-{}-{:02}",
            prefix, time_fragment, sequence_fragment, checksum, entity_fragment, year
        )
    }

    /// Whether `code` has the exact expected grammar and a matching
    /// checksum. Fails closed on anything else.
    pub fn validate(&self, code: &str) -> bool {
        self.parse(code).is_ok()
    }

    /// Like [`validate`](Self::validate), but distinguishes a malformed
    /// shape from a checksum mismatch.
    pub fn parse(&self, code: &str) -> Result<ParsedCode, CodeError> {
        let captures = self.pattern.captures(code).ok_or(CodeError::MalformedCode)?;

        let prefix = &captures[1];
        let time_fragment = &captures[2];
        let sequence_and_checksum = &captures[3];
        let entity_fragment = &captures[4];
        let year = &captures[5];

        let (sequence_fragment, checksum_text) = sequence_and_checksum.split_at(SEQUENCE_CHARS);
        let checksum = checksum_text
            .chars()
            .next()
            .ok_or(CodeError::MalformedCode)?;

        let expected = self.checksum_char(time_fragment, sequence_fragment, entity_fragment);
        if checksum != expected {
            return Err(CodeError::ChecksumMismatch);
        }

        Ok(ParsedCode {
            prefix: prefix.to_string(),
            time_fragment: time_fragment.to_string(),
            sequence_fragment: sequence_fragment.to_string(),
            entity_fragment: entity_fragment.to_string(),
            checksum,
            year: year.to_string(),
        })
    }

    /// Advance the logical clock under the state lock.
    ///
    /// The emitted time value is the wall-clock second, never allowed to
    /// move backwards; the sequence counter increments within one second
    /// and resets when the second changes. When the counter exhausts its
    /// budget the call waits for the next second so no (time, sequence)
    /// pair is ever reused on this process.
    fn advance_clock(state: &mut GeneratorState) -> u64 {
        let mut now = current_secs();
        while now < state.last_secs {
            std::thread::yield_now();
            now = current_secs();
        }

        if now == state.last_secs {
            if state.sequence >= SEQUENCE_MAX {
                while now <= state.last_secs {
                    std::thread::yield_now();
                    now = current_secs();
                }
                state.sequence = 0;
            } else {
                state.sequence += 1;
            }
        } else {
            state.sequence = 0;
        }

        state.last_secs = now;
        now
    }

    fn entity_fragment_cached(&self, state: &mut GeneratorState, entity_id: &str) -> String {
        if let Some(fragment) = state.entity_cache.get(entity_id) {
            return fragment.clone();
        }
        let fragment = self.entity_fragment(entity_id);
        state
            .entity_cache
            .insert(entity_id.to_string(), fragment.clone());
        fragment
    }

    /// Keyed fragment for an entity id: the first 20 bits of the HMAC,
    /// encoded as 4 alphabet chars. Deterministic per id so related codes
    /// can be correlated later.
    fn entity_fragment(&self, entity_id: &str) -> String {
        let digest = self.keyed_hash(entity_id.as_bytes());
        let value = ((digest[0] as u64) << 12) | ((digest[1] as u64) << 4) | (digest[2] as u64 >> 4);
        encode_fragment(value, ENTITY_CHARS)
    }

    /// Checksum character over the concatenated time, sequence and entity
    /// fragments. The prefix and year groups are cosmetic and validated by
    /// shape only.
    fn checksum_char(&self, time: &str, sequence: &str, entity: &str) -> char {
        let mut data = String::with_capacity(time.len() + sequence.len() + entity.len());
        data.push_str(time);
        data.push_str(sequence);
        data.push_str(entity);

        let digest = self.keyed_hash(data.as_bytes());
        CODE_ALPHABET[(digest[0] & 0x1F) as usize] as char
    }

    fn keyed_hash(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Uppercase, strip anything outside A-Z and cap at four characters.
fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .take(4)
        .collect();

    if cleaned.is_empty() {
        "ID".to_string()
    } else {
        cleaned
    }
}

/// Big-endian base-32 encoding at a fixed width. Callers mask the value to
/// the fragment's bit budget first.
fn encode_fragment(value: u64, width: usize) -> String {
    let mut out = vec![b'0'; width];
    let mut rest = value;
    for slot in out.iter_mut().rev() {
        *slot = CODE_ALPHABET[(rest & 0x1F) as usize];
        rest >>= 5;
    }
    String::from_utf8(out).unwrap_or_default()
}

fn current_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
