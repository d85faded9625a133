/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `history`: hist:{id} -> HistoryRecord (JSON)
/// - `recent`: recent:{created_at_ms:020}:{id} -> id (string)
///
/// The zero-padded timestamp makes lexicographic order match creation order,
/// so a reverse scan of `recent` yields newest first.

/// Encode a history key: hist:{id}
pub fn encode_history_key(id: &str) -> Vec<u8> {
    format!("hist:{}", id).into_bytes()
}

/// Encode a recency index key: recent:{created_at_ms:020}:{id}
pub fn encode_recent_key(created_at_ms: i64, id: &str) -> Vec<u8> {
    // pre-epoch timestamps clamp to zero so the padding stays sortable
    format!("recent:{:020}:{}", created_at_ms.max(0), id).into_bytes()
}

/// Decode a recency index key -> (created_at_ms, id)
pub fn decode_recent_key(key: &[u8]) -> Option<(i64, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (millis, id) = key_str.strip_prefix("recent:")?.split_once(':')?;
    Some((millis.parse().ok()?, id.to_string()))
}
