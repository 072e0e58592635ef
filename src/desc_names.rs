/// Only `long` and `double` take up a register pair; arrays of them are
/// references.
#[inline]
pub fn is_wide_desc(desc: &str) -> bool {
    matches!(desc, "J" | "D")
}

/// Number of registers a value of this type occupies.
#[inline]
pub fn desc_word_size(desc: &str) -> u32 {
    if is_wide_desc(desc) {
        2
    } else {
        1
    }
}
