//! Seeded rolling hash used to look names up in the catalog

const SEED_MODULUS: u32 = 0x7FFF_FFFE;
const RESULT_MODULUS: u32 = 0x7FFF_FFFF;

/// Hash a logical file name with the catalog's two seeds.
///
/// Each UTF-16 unit is uppercased and `\` is folded to `/` before mixing, so
/// lookups are case-insensitive and separator-agnostic. Multiplications wrap
/// at 32 bits before the modulo, matching the archive producer.
pub fn name_hash(name: &str, seed_a: u32, seed_b: u32) -> u32 {
    let mut seed = seed_a;
    let mut result = 0u32;

    for unit in name.encode_utf16() {
        seed = seed.wrapping_mul(seed_b) % SEED_MODULUS;
        result = result
            .wrapping_mul(seed)
            .wrapping_add(u32::from(fold_unit(unit)))
            % RESULT_MODULUS;
    }

    result
}

/// Normalize a name the same way [`name_hash`] sees it
pub fn normalize_name(name: &str) -> String {
    let units: Vec<u16> = name.encode_utf16().map(fold_unit).collect();
    String::from_utf16_lossy(&units)
}

/// Uppercase one UTF-16 unit, keeping it when the mapping is not one-to-one
fn fold_unit(unit: u16) -> u16 {
    if unit == u16::from(b'\\') {
        return u16::from(b'/');
    }

    let Some(c) = char::from_u32(u32::from(unit)) else {
        // Surrogate halves have no case
        return unit;
    };

    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u16::try_from(u32::from(u)).unwrap_or(unit),
        _ => unit,
    }
}
