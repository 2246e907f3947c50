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

/// Number of hex digits kept from the digest.
pub const ETAG_DIGITS: usize = 20;

/// Compute the etag for a state's bytes, in the form it appears in HTTP
/// headers: the last 20 hex digits of the MD5 digest, including the quotes,
/// e.g. `"0123456789abcdef0123"`.
pub fn compute_etag(data: &[u8]) -> String {
    let digest = format!("{:x}", md5::compute(data));
    format!("\"{}\"", &digest[digest.len() - ETAG_DIGITS..])
}
