// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::storage::StorageError;
use rand::RngCore;

/// Random bytes per state id (hex encoded, so ids are twice as long).
pub const STATE_ID_BYTES: usize = 10;
pub const STATE_ID_LEN: usize = STATE_ID_BYTES * 2;

pub fn generate_state_id() -> String {
    let mut buf = [0u8; STATE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Exactly 20 lowercase hex digits.
pub fn is_valid_state_id(id: &str) -> bool {
    id.len() == STATE_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn validate_state_id(id: &str) -> Result<(), StorageError> {
    if !is_valid_state_id(id) {
        return Err(StorageError::InvalidInput(format!(
            "state id must be {} lowercase hex digits: {:?}",
            STATE_ID_LEN, id
        )));
    }
    Ok(())
}
