//! Decoding of server-sent event `data` payloads.
//!
//! Upstream event streams serialize string payloads as JSON string tokens, so a text event
//! arrives quoted and escaped. [`decode`] unwraps such tokens and passes everything else
//! through as UTF-8 text.

/// Decodes one event payload into text.
///
/// A payload framed by double quotes is parsed as a JSON string; if that fails, or the
/// payload is not quoted, the raw bytes are decoded as (lossy) UTF-8.
pub fn decode(data: &[u8]) -> String {
	if data.is_empty() {
		return String::new();
	}

	matches!(data, [b'"', .., b'"'])
		.then(|| serde_json::from_slice::<String>(data).ok())
		.flatten()
		.unwrap_or_else(|| String::from_utf8_lossy(data).into_owned())
}

/// Decodes a payload delivered in several buffers.
///
/// Segments are joined before decoding, so multi-byte characters and escapes may straddle
/// segment boundaries.
pub fn decode_segments(segments: &[&[u8]]) -> String {
	match segments {
		[] => String::new(),
		[single] => decode(single),
		_ => decode(&segments.concat()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn empty_payload_is_empty_text() {
		assert_eq!(decode(b""), "");
		assert_eq!(decode_segments(&[]), "");
	}

	#[test]
	fn plain_utf8_passes_through() {
		assert_eq!(decode("你好！".as_bytes()), "你好！");
		assert_eq!(decode(b"{\"progress\":3}"), "{\"progress\":3}");
	}

	#[test]
	fn json_string_tokens_are_unquoted_and_unescaped() {
		assert_eq!(decode("\"你好\"".as_bytes()), "你好");
		assert_eq!(decode(b"\"line1\\nline2\""), "line1\nline2");
	}

	#[test]
	fn invalid_json_token_falls_back_to_raw_text() {
		assert_eq!(decode(b"\"bad \\q escape\""), "\"bad \\q escape\"");
		assert_eq!(decode(b"\""), "\"");
	}

	#[test]
	fn segments_are_joined_before_decoding() {
		let bytes = "\"你好\"".as_bytes();
		// Split inside the multi-byte encoding of the first character.
		let (first, second) = bytes.split_at(2);

		assert_eq!(decode_segments(&[first, second]), "你好");
		assert_eq!(decode_segments(&[b"\"abc\""]), "abc");
	}
}
