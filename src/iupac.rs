const BASE_A: u8 = 1;
const BASE_C: u8 = 2;
const BASE_G: u8 = 4;
const BASE_T: u8 = 8;

/// A bitmasked IUPAC nucleotide code, eg BASE_A|BASE_G for 'R'
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IupacCode(u8);

impl IupacCode {
    #[inline(always)]
    pub fn from_letter(letter: u8) -> Self {
        match letter.to_ascii_uppercase() {
            b'A' => Self(BASE_A),
            b'C' => Self(BASE_C),
            b'G' => Self(BASE_G),
            b'T' | b'U' => Self(BASE_T),
            b'W' => Self(BASE_A | BASE_T),
            b'S' => Self(BASE_C | BASE_G),
            b'M' => Self(BASE_A | BASE_C),
            b'K' => Self(BASE_G | BASE_T),
            b'R' => Self(BASE_A | BASE_G),
            b'Y' => Self(BASE_C | BASE_T),
            b'B' => Self(BASE_C | BASE_G | BASE_T),
            b'D' => Self(BASE_A | BASE_G | BASE_T),
            b'H' => Self(BASE_A | BASE_C | BASE_T),
            b'V' => Self(BASE_A | BASE_C | BASE_G),
            b'N' => Self(BASE_A | BASE_C | BASE_G | BASE_T),
            _ => Self(0),
        }
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every base allowed by `self` is also allowed by `pattern`
    #[inline(always)]
    pub fn within(self, pattern: IupacCode) -> bool {
        !self.is_empty() && self.0 & pattern.0 == self.0
    }
}

/// Does the (possibly ambiguous) base `base` match `pattern`?
///
/// A concrete base matches any code that includes it, so 'A' matches 'R', 'M',
/// 'W', 'D', 'H', 'V' and 'N' as well as 'A'. Case is ignored.
pub fn matches(base: u8, pattern: u8) -> bool {
    IupacCode::from_letter(base).within(IupacCode::from_letter(pattern))
}

/// Watson-Crick complement, preserving case and IUPAC ambiguity
pub fn complement(base: u8) -> u8 {
    let upper = match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        other => other, // S, W, N and gaps are self-complementary
    };
    if base.is_ascii_lowercase() {
        upper.to_ascii_lowercase()
    } else {
        upper
    }
}
