//! Edge case round trips for DEFLATE and Deflate64.

use oxiflate_deflate::{
    DeflateProperties, Deflater, PropValue, deflate, deflate64, inflate, inflate64, inflate_mt,
};
use oxiflate_core::StreamEncoder;

fn lcg_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn check_all_levels(input: &[u8]) {
    for level in 0..=9u8 {
        let compressed = deflate(input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "deflate level {level}");

        let compressed = deflate64(input, level).unwrap();
        assert_eq!(inflate64(&compressed).unwrap(), input, "deflate64 level {level}");
    }
}

#[test]
fn test_empty_input() {
    check_all_levels(b"");
}

#[test]
fn test_single_byte() {
    check_all_levels(b"A");
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    check_all_levels(&input);
    let compressed = deflate(&input, 6).unwrap();
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_all_same_byte() {
    let input = vec![255u8; 5000];
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 20);
}

#[test]
fn test_max_match_length() {
    let input = vec![42u8; 258 * 10];
    check_all_levels(&input);
}

#[test]
fn test_random_bytes() {
    let input = lcg_bytes(50_000, 1);
    check_all_levels(&input);
}

#[test]
fn test_alternating_pattern() {
    let input: Vec<u8> = (0..1000).map(|i| if i % 2 == 0 { b'A' } else { b'B' }).collect();
    check_all_levels(&input);
}

#[test]
fn test_incremental_pattern() {
    let mut input = Vec::new();
    for i in 0..256 {
        input.extend(std::iter::repeat_n(i as u8, 10));
    }
    check_all_levels(&input);
}

#[test]
fn test_binary_data() {
    let input: Vec<u8> = (0..=255).cycle().take(5000).collect();
    check_all_levels(&input);
}

#[test]
fn test_utf8_text() {
    let input = "Größenmaßstäbe, 東京, Ελληνικά, and plain ASCII. ".repeat(100);
    check_all_levels(input.as_bytes());
}

#[test]
fn test_long_distance_match() {
    let mut input = vec![0u8; 32768];
    let pattern = b"PATTERN_TO_MATCH";
    input[..pattern.len()].copy_from_slice(pattern);
    input[32768 - pattern.len()..].copy_from_slice(pattern);
    check_all_levels(&input);
}

#[test]
fn test_large_input() {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut input = pattern.repeat(1024 * 1024 / pattern.len() + 1);
    input.truncate(1024 * 1024);

    for level in [1u8, 5, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert!(compressed.len() < input.len() / 50, "level {level}");
        assert_eq!(inflate(&compressed).unwrap(), input);
        assert_eq!(inflate_mt(&compressed).unwrap(), input);
    }
}

#[test]
fn test_higher_levels_not_larger_on_repetition() {
    let pattern = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHI";
    let input: Vec<u8> = pattern.iter().copied().cycle().take(300_000).collect();
    let fast = deflate(&input, 1).unwrap();
    for level in [5u8, 7, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert!(
            compressed.len() <= fast.len(),
            "level {level}: {} bytes, level 1: {} bytes",
            compressed.len(),
            fast.len()
        );
        assert_eq!(inflate(&compressed).unwrap(), input);
    }
}

#[test]
fn test_mixed_content() {
    let mut input = Vec::new();
    for round in 0..8u32 {
        input.extend(lcg_bytes(7000, round));
        input.extend(format!("section {round} ").repeat(900).into_bytes());
    }
    check_all_levels(&input);
}

#[test]
fn test_stored_level_exact_size() {
    let input = b"0123456789";
    let compressed = deflate(input, 0).unwrap();
    assert_eq!(compressed.len(), 15);
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_named_properties() {
    let input = b"named properties, named properties, named properties".repeat(40);
    let mut deflater = Deflater::new(DeflateProperties::default());
    deflater
        .set_properties(&[
            ("Level", PropValue::U32(9)),
            ("Method", PropValue::Str("deflate64")),
            ("NumPasses", PropValue::U32(10)),
            ("FastBytes", PropValue::U32(258)),
            ("NumDivPasses", PropValue::U32(8)),
        ])
        .unwrap();
    let compressed = deflater.encode_all(&input).unwrap();
    assert_eq!(inflate64(&compressed).unwrap(), input);
}
