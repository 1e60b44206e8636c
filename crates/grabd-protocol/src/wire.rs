//! Wire format: one operation per datagram.
//!
//! ```text
//! [operation type:1][payload, fixed little-endian layout per type]
//! ```
//!
//! | type | operation                       | size rule | payload                                      |
//! |------|---------------------------------|-----------|----------------------------------------------|
//! | 1    | `connect`                       | exact     | pid:i32, path:[u8; 1024]                     |
//! | 2    | `system_preferences_updated`    | at least  | fn_state:u8, natural_scroll:u8, kbd_type:u32 |
//! | 3    | `frontmost_application_changed` | at least  | bundle_id:[u8; 256], file_path:[u8; 1024]    |
//! | 4    | `input_source_changed`          | at least  | language, source_id, mode_id: [u8; 256] each |
//! | 5    | `grabbable_state_changed`       | exact     | device_id:u64, state:u8, reason:u8, ts:u64   |
//!
//! The sender is a separate, less trusted process. Sizes are checked before
//! any field is read, and every fixed-capacity string has its last byte
//! forced to NUL before it is interpreted.

use grabd_types::{
    DeviceId, GrabbableState, InputSourceIdentifiers, State, SystemPreferences,
    UngrabbableTemporarilyReason,
};

use crate::error::ProtocolError;

/// Capacity of file path fields, terminator included.
pub const PATH_CAPACITY: usize = 1024;

/// Capacity of bundle identifier and input source fields, terminator included.
pub const IDENTIFIER_CAPACITY: usize = 256;

pub const GRABBABLE_STATE_CHANGED_SIZE: usize = 1 + 8 + 1 + 1 + 8;
pub const CONNECT_SIZE: usize = 1 + 4 + PATH_CAPACITY;
pub const SYSTEM_PREFERENCES_UPDATED_MIN_SIZE: usize = 1 + 1 + 1 + 4;
pub const FRONTMOST_APPLICATION_CHANGED_MIN_SIZE: usize = 1 + IDENTIFIER_CAPACITY + PATH_CAPACITY;
pub const INPUT_SOURCE_CHANGED_MIN_SIZE: usize = 1 + 3 * IDENTIFIER_CAPACITY;

/// Operation tag carried in the first byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationType {
    None = 0,
    Connect = 1,
    SystemPreferencesUpdated = 2,
    FrontmostApplicationChanged = 3,
    InputSourceChanged = 4,
    GrabbableStateChanged = 5,
}

impl TryFrom<u8> for OperationType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Connect),
            2 => Ok(Self::SystemPreferencesUpdated),
            3 => Ok(Self::FrontmostApplicationChanged),
            4 => Ok(Self::InputSourceChanged),
            5 => Ok(Self::GrabbableStateChanged),
            _ => Err(ProtocolError::UnknownOperation(value)),
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Connect => "connect",
            Self::SystemPreferencesUpdated => "system_preferences_updated",
            Self::FrontmostApplicationChanged => "frontmost_application_changed",
            Self::InputSourceChanged => "input_source_changed",
            Self::GrabbableStateChanged => "grabbable_state_changed",
        };
        f.write_str(name)
    }
}

/// How the datagram length of an operation is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRule {
    Exact(usize),
    AtLeast(usize),
}

impl SizeRule {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            Self::Exact(size) => len == size,
            Self::AtLeast(size) => len >= size,
        }
    }
}

impl std::fmt::Display for SizeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(size) => write!(f, "exactly {size}"),
            Self::AtLeast(size) => write!(f, "at least {size}"),
        }
    }
}

impl OperationType {
    /// Size rule for this operation, or `None` for operations that carry
    /// nothing to act on.
    pub fn size_rule(self) -> Option<SizeRule> {
        match self {
            Self::None => None,
            Self::Connect => Some(SizeRule::Exact(CONNECT_SIZE)),
            Self::SystemPreferencesUpdated => {
                Some(SizeRule::AtLeast(SYSTEM_PREFERENCES_UPDATED_MIN_SIZE))
            }
            Self::FrontmostApplicationChanged => {
                Some(SizeRule::AtLeast(FRONTMOST_APPLICATION_CHANGED_MIN_SIZE))
            }
            Self::InputSourceChanged => Some(SizeRule::AtLeast(INPUT_SOURCE_CHANGED_MIN_SIZE)),
            Self::GrabbableStateChanged => Some(SizeRule::Exact(GRABBABLE_STATE_CHANGED_SIZE)),
        }
    }
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A device's grabbable state as judged by the observer.
    GrabbableStateChanged(GrabbableState),

    /// A console user session attached.
    Connect {
        pid: i32,
        user_core_configuration_file_path: String,
    },

    SystemPreferencesUpdated(SystemPreferences),

    FrontmostApplicationChanged {
        bundle_identifier: String,
        file_path: String,
    },

    InputSourceChanged(InputSourceIdentifiers),
}

impl Operation {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::GrabbableStateChanged(_) => OperationType::GrabbableStateChanged,
            Self::Connect { .. } => OperationType::Connect,
            Self::SystemPreferencesUpdated(_) => OperationType::SystemPreferencesUpdated,
            Self::FrontmostApplicationChanged { .. } => OperationType::FrontmostApplicationChanged,
            Self::InputSourceChanged(_) => OperationType::InputSourceChanged,
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode an operation into a datagram.
///
/// Strings longer than their field are truncated on a character boundary so
/// that a terminator always fits.
pub fn encode(op: &Operation) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONNECT_SIZE);
    buf.push(op.operation_type() as u8);

    match op {
        Operation::GrabbableStateChanged(state) => {
            buf.extend_from_slice(&state.device_id().0.to_le_bytes());
            buf.push(state.state() as u8);
            buf.push(state.reason() as u8);
            buf.extend_from_slice(&state.timestamp().to_le_bytes());
        }
        Operation::Connect {
            pid,
            user_core_configuration_file_path,
        } => {
            buf.extend_from_slice(&pid.to_le_bytes());
            write_fixed_string(&mut buf, user_core_configuration_file_path, PATH_CAPACITY);
        }
        Operation::SystemPreferencesUpdated(prefs) => {
            buf.push(u8::from(prefs.keyboard_fn_state));
            buf.push(u8::from(prefs.swipe_scroll_direction_natural));
            buf.extend_from_slice(&prefs.keyboard_type.to_le_bytes());
        }
        Operation::FrontmostApplicationChanged {
            bundle_identifier,
            file_path,
        } => {
            write_fixed_string(&mut buf, bundle_identifier, IDENTIFIER_CAPACITY);
            write_fixed_string(&mut buf, file_path, PATH_CAPACITY);
        }
        Operation::InputSourceChanged(ids) => {
            write_fixed_string(&mut buf, &ids.language, IDENTIFIER_CAPACITY);
            write_fixed_string(&mut buf, &ids.input_source_id, IDENTIFIER_CAPACITY);
            write_fixed_string(&mut buf, &ids.input_mode_id, IDENTIFIER_CAPACITY);
        }
    }

    buf
}

fn write_fixed_string(buf: &mut Vec<u8>, value: &str, capacity: usize) {
    let mut len = value.len().min(capacity - 1);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    buf.extend_from_slice(&value.as_bytes()[..len]);
    buf.resize(buf.len() + (capacity - len), 0);
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode one datagram.
///
/// Errors are classified so the caller can choose how loudly to complain:
/// [`ProtocolError::UnknownOperation`] and [`ProtocolError::Empty`] come from
/// newer or idle senders, while [`ProtocolError::InvalidSize`] and
/// [`ProtocolError::Malformed`] mean the sender is broken.
pub fn decode(bytes: &[u8]) -> Result<Operation, ProtocolError> {
    let (&tag, _) = bytes.split_first().ok_or(ProtocolError::Empty)?;
    let operation = OperationType::try_from(tag)?;
    let rule = operation
        .size_rule()
        .ok_or(ProtocolError::UnknownOperation(tag))?;

    if !rule.accepts(bytes.len()) {
        return Err(ProtocolError::InvalidSize {
            operation,
            expected: rule,
            actual: bytes.len(),
        });
    }

    let mut reader = PayloadReader::new(operation, &bytes[1..]);
    match operation {
        OperationType::GrabbableStateChanged => decode_grabbable_state(&mut reader),
        OperationType::Connect => {
            let pid = reader.read_i32()?;
            let user_core_configuration_file_path = reader.read_fixed_string(PATH_CAPACITY)?;
            Ok(Operation::Connect {
                pid,
                user_core_configuration_file_path,
            })
        }
        OperationType::SystemPreferencesUpdated => {
            let keyboard_fn_state = reader.read_u8()? != 0;
            let swipe_scroll_direction_natural = reader.read_u8()? != 0;
            let keyboard_type = reader.read_u32()?;
            Ok(Operation::SystemPreferencesUpdated(SystemPreferences {
                keyboard_fn_state,
                swipe_scroll_direction_natural,
                keyboard_type,
            }))
        }
        OperationType::FrontmostApplicationChanged => {
            let bundle_identifier = reader.read_fixed_string(IDENTIFIER_CAPACITY)?;
            let file_path = reader.read_fixed_string(PATH_CAPACITY)?;
            Ok(Operation::FrontmostApplicationChanged {
                bundle_identifier,
                file_path,
            })
        }
        OperationType::InputSourceChanged => {
            let language = reader.read_fixed_string(IDENTIFIER_CAPACITY)?;
            let input_source_id = reader.read_fixed_string(IDENTIFIER_CAPACITY)?;
            let input_mode_id = reader.read_fixed_string(IDENTIFIER_CAPACITY)?;
            Ok(Operation::InputSourceChanged(InputSourceIdentifiers {
                language,
                input_source_id,
                input_mode_id,
            }))
        }
        OperationType::None => Err(ProtocolError::UnknownOperation(tag)),
    }
}

fn decode_grabbable_state(reader: &mut PayloadReader<'_>) -> Result<Operation, ProtocolError> {
    let device_id = DeviceId(reader.read_u64()?);
    let state = State::try_from(reader.read_u8()?).map_err(|e| reader.malformed(e.to_string()))?;
    let reason = UngrabbableTemporarilyReason::try_from(reader.read_u8()?)
        .map_err(|e| reader.malformed(e.to_string()))?;
    let timestamp = reader.read_u64()?;

    GrabbableState::from_parts(device_id, state, reason, timestamp)
        .map(Operation::GrabbableStateChanged)
        .ok_or_else(|| reader.malformed(format!("reason {reason} is inconsistent with state {state}")))
}

/// Interpret a fixed-capacity string field.
///
/// The last byte is overwritten with NUL before scanning, so the result
/// never extends past `capacity - 1` bytes whatever the field contains.
pub fn terminated_string(field: &[u8]) -> String {
    let mut field = field.to_vec();
    if let Some(last) = field.last_mut() {
        *last = 0;
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Bounds-checked little-endian reader over a payload.
struct PayloadReader<'a> {
    operation: OperationType,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(operation: OperationType, bytes: &'a [u8]) -> Self {
        Self {
            operation,
            bytes,
            offset: 0,
        }
    }

    fn malformed(&self, reason: String) -> ProtocolError {
        ProtocolError::Malformed {
            operation: self.operation,
            reason,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let bytes = self.bytes;
        let end = self.offset + len;
        let slice = bytes.get(self.offset..end).ok_or_else(|| {
            self.malformed(format!(
                "field at offset {} needs {len} bytes, {} available",
                self.offset,
                self.bytes.len().saturating_sub(self.offset)
            ))
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    fn read_fixed_string(&mut self, capacity: usize) -> Result<String, ProtocolError> {
        Ok(terminated_string(self.take(capacity)?))
    }
}
