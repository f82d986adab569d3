//! Culture-aware string ordering.
//!
//! A [`Collation`] is written as `culture/Options`, for example
//! `en-US/IgnoreCase` or `pt-BR/IgnoreCase, IgnoreNonSpace`. Comparison is
//! multi-level: base characters first, then accents, then case and width,
//! and finally the characters that word sort ignores (`-` and `'`).
//! Ordinal collations compare code points directly.

use crate::error::{CoreError, CoreResult};
use litedoc_bson::Value;
use std::cmp::Ordering;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Comparison flags, numerically compatible with the usual culture APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompareOptions(u32);

impl CompareOptions {
    /// Culture-aware, case and accent sensitive.
    pub const NONE: Self = Self(0);
    /// Ignore letter case.
    pub const IGNORE_CASE: Self = Self(0x0000_0001);
    /// Ignore diacritics.
    pub const IGNORE_NON_SPACE: Self = Self(0x0000_0002);
    /// Ignore whitespace, punctuation and symbols.
    pub const IGNORE_SYMBOLS: Self = Self(0x0000_0004);
    /// Treat hiragana and katakana as equal.
    pub const IGNORE_KANA_TYPE: Self = Self(0x0000_0008);
    /// Treat full-width and half-width forms as equal.
    pub const IGNORE_WIDTH: Self = Self(0x0000_0010);
    /// Code point order after upper-casing.
    pub const ORDINAL_IGNORE_CASE: Self = Self(0x1000_0000);
    /// Do not skip hyphens and apostrophes.
    pub const STRING_SORT: Self = Self(0x2000_0000);
    /// Code point order.
    pub const ORDINAL: Self = Self(0x4000_0000);

    const NAMES: [(&'static str, Self); 8] = [
        ("IgnoreCase", Self::IGNORE_CASE),
        ("IgnoreNonSpace", Self::IGNORE_NON_SPACE),
        ("IgnoreSymbols", Self::IGNORE_SYMBOLS),
        ("IgnoreKanaType", Self::IGNORE_KANA_TYPE),
        ("IgnoreWidth", Self::IGNORE_WIDTH),
        ("OrdinalIgnoreCase", Self::ORDINAL_IGNORE_CASE),
        ("StringSort", Self::STRING_SORT),
        ("Ordinal", Self::ORDINAL),
    ];

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CompareOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for CompareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("None");
        }
        let mut first = true;
        for (name, flag) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl FromStr for CompareOptions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Self::NONE;
        for part in s.split(',').map(str::trim) {
            if part.eq_ignore_ascii_case("None") {
                continue;
            }
            let (_, flag) = Self::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| format!("unknown compare option '{part}'"))?;
            options = options | *flag;
        }
        let ordinal = options.contains(Self::ORDINAL) || options.contains(Self::ORDINAL_IGNORE_CASE);
        if ordinal && options != Self::ORDINAL && options != Self::ORDINAL_IGNORE_CASE {
            return Err("Ordinal options cannot be combined with other flags".to_string());
        }
        Ok(options)
    }
}

const INVARIANT: &str = "invariant";

const LCIDS: [(&str, i32); 11] = [
    (INVARIANT, 127),
    ("en-US", 1033),
    ("en-GB", 2057),
    ("de-DE", 1031),
    ("fr-FR", 1036),
    ("es-ES", 3082),
    ("it-IT", 1040),
    ("ja-JP", 1041),
    ("pt-BR", 1046),
    ("pt-PT", 2070),
    ("zh-CN", 2052),
];

/// Locale identifier reported for cultures without a fixed one.
const LOCALE_CUSTOM_UNSPECIFIED: i32 = 4096;

/// Ordering and equality policy for strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collation {
    culture: String,
    lcid: i32,
    options: CompareOptions,
}

impl Default for Collation {
    /// `en-US/IgnoreCase`.
    fn default() -> Self {
        Self {
            culture: "en-US".to_string(),
            lcid: 1033,
            options: CompareOptions::IGNORE_CASE,
        }
    }
}

impl Collation {
    /// Creates a collation from a culture name and options.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCollation`] if the culture name is not a
    /// well-formed language tag.
    pub fn new(culture: &str, options: CompareOptions) -> CoreResult<Self> {
        let culture = canonical_culture(culture)
            .ok_or_else(|| CoreError::invalid_collation(culture, "malformed culture name"))?;
        let lcid = LCIDS
            .iter()
            .find(|(name, _)| *name == culture)
            .map_or(LOCALE_CUSTOM_UNSPECIFIED, |(_, id)| *id);
        Ok(Self {
            culture,
            lcid,
            options,
        })
    }

    /// Exact code point order over the invariant culture.
    #[must_use]
    pub fn binary() -> Self {
        Self {
            culture: INVARIANT.to_string(),
            lcid: 127,
            options: CompareOptions::ORDINAL,
        }
    }

    /// Parses `culture[/Options]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCollation`] for unknown option names or
    /// malformed culture names.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let (culture, options) = match text.split_once('/') {
            Some((culture, options)) => {
                let options = options
                    .parse::<CompareOptions>()
                    .map_err(|message| CoreError::invalid_collation(text, message))?;
                (culture, options)
            }
            None => (text, CompareOptions::NONE),
        };
        Self::new(culture.trim(), options).map_err(|_| CoreError::invalid_collation(text, "malformed culture name"))
    }

    /// Culture name.
    #[must_use]
    pub fn culture(&self) -> &str {
        &self.culture
    }

    /// Locale identifier.
    #[must_use]
    pub fn lcid(&self) -> i32 {
        self.lcid
    }

    /// Comparison flags.
    #[must_use]
    pub fn options(&self) -> CompareOptions {
        self.options
    }

    /// Compares two strings.
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        if self.options == CompareOptions::ORDINAL {
            return a.cmp(b);
        }
        if self.options == CompareOptions::ORDINAL_IGNORE_CASE {
            return a
                .chars()
                .flat_map(char::to_uppercase)
                .cmp(b.chars().flat_map(char::to_uppercase));
        }
        let (ka, kb) = (self.sort_key(a), self.sort_key(b));
        ka.primary
            .cmp(&kb.primary)
            .then_with(|| ka.secondary.cmp(&kb.secondary))
            .then_with(|| ka.tertiary.cmp(&kb.tertiary))
            .then_with(|| ka.ignored.cmp(&kb.ignored))
    }

    /// True if the strings compare equal.
    #[must_use]
    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Compares two values, routing strings through this collation.
    #[must_use]
    pub fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        a.compare_by(b, &|x: &str, y: &str| self.compare(x, y))
    }

    /// True if `text` begins with `prefix` under this collation.
    #[must_use]
    pub fn starts_with(&self, text: &str, prefix: &str) -> bool {
        let (kt, kp) = (self.sort_key(text), self.sort_key(prefix));
        let n = kp.primary.len();
        kt.primary.len() >= n
            && kt.primary[..n] == kp.primary[..]
            && kt.secondary[..n] == kp.secondary[..]
            && kt.tertiary[..n] == kp.tertiary[..]
    }

    /// Orders `text` relative to the block of strings starting with `prefix`,
    /// comparing base characters only.
    ///
    /// `Equal` means `text` lies inside the block; a sorted scan can stop at
    /// the first `Greater`.
    #[must_use]
    pub fn prefix_cmp(&self, text: &str, prefix: &str) -> Ordering {
        let (tp, pp) = (self.sort_key(text).primary, self.sort_key(prefix).primary);
        if tp.len() >= pp.len() {
            tp[..pp.len()].cmp(&pp)
        } else {
            match tp[..].cmp(&pp[..tp.len()]) {
                Ordering::Equal => Ordering::Less,
                other => other,
            }
        }
    }

    fn sort_key(&self, s: &str) -> SortKey {
        let options = self.options;
        let mut key = SortKey::default();

        if options == CompareOptions::ORDINAL || options == CompareOptions::ORDINAL_IGNORE_CASE {
            let fold = options == CompareOptions::ORDINAL_IGNORE_CASE;
            for c in s.chars() {
                let c = if fold { c.to_uppercase().next().unwrap_or(c) } else { c };
                key.push(u32::from(c), 0, 0);
            }
            return key;
        }

        for c in s.chars() {
            if is_combining_mark(c) {
                if !options.contains(CompareOptions::IGNORE_NON_SPACE) {
                    if let Some(last) = key.secondary.last_mut() {
                        *last = last.wrapping_mul(0x400).wrapping_add(u32::from(c));
                    }
                }
                continue;
            }
            if options.contains(CompareOptions::IGNORE_SYMBOLS) && !c.is_alphanumeric() {
                continue;
            }
            if (c == '-' || c == '\'') && !options.contains(CompareOptions::STRING_SORT) {
                key.ignored.push(c);
                continue;
            }

            let mut tertiary = 0u8;
            let mut c = c;
            if let Some(narrow) = narrow_form(c) {
                c = narrow;
                if !options.contains(CompareOptions::IGNORE_WIDTH) {
                    tertiary |= 0b010;
                }
            }
            if let Some(hiragana) = hiragana_form(c) {
                c = hiragana;
                if !options.contains(CompareOptions::IGNORE_KANA_TYPE) {
                    tertiary |= 0b100;
                }
            }
            if c.is_uppercase() && !options.contains(CompareOptions::IGNORE_CASE) {
                tertiary |= 0b001;
            }

            let lower = c.to_lowercase().next().unwrap_or(c);
            let (base, accent) = strip_accent(lower);
            let accent = if options.contains(CompareOptions::IGNORE_NON_SPACE) {
                0
            } else {
                accent
            };
            key.push((char_class(base) << 21) | u32::from(base), accent, tertiary);
        }
        key
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.culture, self.options)
    }
}

impl FromStr for Collation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Default)]
struct SortKey {
    primary: Vec<u32>,
    secondary: Vec<u32>,
    tertiary: Vec<u8>,
    ignored: Vec<char>,
}

impl SortKey {
    fn push(&mut self, primary: u32, secondary: u32, tertiary: u8) {
        self.primary.push(primary);
        self.secondary.push(secondary);
        self.tertiary.push(tertiary);
    }
}

fn canonical_culture(name: &str) -> Option<String> {
    if name.is_empty() || name.eq_ignore_ascii_case(INVARIANT) {
        return Some(INVARIANT.to_string());
    }
    let mut parts = name.split('-');
    let language = parts.next()?;
    if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut out = language.to_ascii_lowercase();
    for part in parts {
        if !(2..=8).contains(&part.len()) || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        out.push('-');
        if part.len() == 2 {
            out.push_str(&part.to_ascii_uppercase());
        } else {
            out.push_str(part);
        }
    }
    Some(out)
}

fn char_class(c: char) -> u32 {
    if c.is_alphabetic() {
        2
    } else if c.is_numeric() {
        1
    } else {
        0
    }
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn narrow_form(c: char) -> Option<char> {
    if ('\u{FF01}'..='\u{FF5E}').contains(&c) {
        char::from_u32(u32::from(c) - 0xFEE0)
    } else {
        None
    }
}

fn hiragana_form(c: char) -> Option<char> {
    if ('\u{30A1}'..='\u{30F6}').contains(&c) {
        char::from_u32(u32::from(c) - 0x60)
    } else {
        None
    }
}

/// Splits a lower-case Latin letter into base letter and combining mark.
fn strip_accent(c: char) -> (char, u32) {
    const GRAVE: u32 = 0x300;
    const ACUTE: u32 = 0x301;
    const CIRCUMFLEX: u32 = 0x302;
    const TILDE: u32 = 0x303;
    const DIAERESIS: u32 = 0x308;
    const RING: u32 = 0x30A;
    const CEDILLA: u32 = 0x327;
    const STROKE: u32 = 0x338;

    match c {
        'à' => ('a', GRAVE),
        'á' => ('a', ACUTE),
        'â' => ('a', CIRCUMFLEX),
        'ã' => ('a', TILDE),
        'ä' => ('a', DIAERESIS),
        'å' => ('a', RING),
        'ç' => ('c', CEDILLA),
        'è' => ('e', GRAVE),
        'é' => ('e', ACUTE),
        'ê' => ('e', CIRCUMFLEX),
        'ë' => ('e', DIAERESIS),
        'ì' => ('i', GRAVE),
        'í' => ('i', ACUTE),
        'î' => ('i', CIRCUMFLEX),
        'ï' => ('i', DIAERESIS),
        'ñ' => ('n', TILDE),
        'ò' => ('o', GRAVE),
        'ó' => ('o', ACUTE),
        'ô' => ('o', CIRCUMFLEX),
        'õ' => ('o', TILDE),
        'ö' => ('o', DIAERESIS),
        'ø' => ('o', STROKE),
        'ù' => ('u', GRAVE),
        'ú' => ('u', ACUTE),
        'û' => ('u', CIRCUMFLEX),
        'ü' => ('u', DIAERESIS),
        'ý' => ('y', ACUTE),
        'ÿ' => ('y', DIAERESIS),
        other => (other, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ignore_case_versus_ordinal() {
        let ci = Collation::default();
        assert_eq!(ci.compare("abc", "ABC"), Ordering::Equal);
        let ordinal = Collation::binary();
        assert_ne!(ordinal.compare("abc", "ABC"), Ordering::Equal);
    }

    #[test]
    fn parse_and_display() {
        let c = Collation::parse("pt-br/IgnoreCase,IgnoreNonSpace").unwrap();
        assert_eq!(c.culture(), "pt-BR");
        assert_eq!(c.lcid(), 1046);
        assert_eq!(c.to_string(), "pt-BR/IgnoreCase, IgnoreNonSpace");
        assert_eq!(Collation::parse(&c.to_string()).unwrap(), c);
        assert_eq!(Collation::default().to_string(), "en-US/IgnoreCase");
        assert_eq!(Collation::parse("en-US").unwrap().options(), CompareOptions::NONE);
        assert_eq!(Collation::parse("sw-KE/None").unwrap().lcid(), 4096);
        assert_eq!(Collation::binary().lcid(), 127);
    }

    #[test]
    fn parse_failures() {
        for bad in ["en-US/Bogus", "e/IgnoreCase", "en_US", "en-US/Ordinal,IgnoreCase", "en-$$"] {
            let err = Collation::parse(bad).unwrap_err();
            assert!(matches!(err, CoreError::InvalidCollation { .. }), "{bad}");
        }
    }

    #[test]
    fn accents_follow_options() {
        let sensitive = Collation::default();
        assert_ne!(sensitive.compare("café", "cafe"), Ordering::Equal);
        assert_eq!(sensitive.compare("café", "cafe\u{301}"), Ordering::Equal);
        let insensitive = Collation::parse("en-US/IgnoreCase,IgnoreNonSpace").unwrap();
        assert_eq!(insensitive.compare("Café", "cafe"), Ordering::Equal);
    }

    #[test]
    fn case_sensitive_orders_lower_first() {
        let c = Collation::parse("en-US/None").unwrap();
        assert_eq!(c.compare("a", "A"), Ordering::Less);
        assert_eq!(c.compare("A", "b"), Ordering::Less);
        assert_eq!(Collation::binary().compare("A", "b"), Ordering::Less);
        assert_eq!(Collation::binary().compare("a", "B"), Ordering::Greater);
    }

    #[test]
    fn word_sort_skips_hyphen_at_first_level() {
        let c = Collation::default();
        assert_eq!(c.compare("coop", "co-op"), Ordering::Less);
        assert_eq!(c.compare("co-op", "cop"), Ordering::Less);
        let string_sort = Collation::parse("en-US/IgnoreCase,StringSort").unwrap();
        assert_eq!(string_sort.compare("co-op", "coa"), Ordering::Less);
    }

    #[test]
    fn symbols_and_width() {
        let c = Collation::parse("en-US/IgnoreSymbols").unwrap();
        assert_eq!(c.compare("a b!", "ab"), Ordering::Equal);
        let w = Collation::parse("ja-JP/IgnoreWidth,IgnoreKanaType").unwrap();
        assert_eq!(w.compare("ＡＢ", "AB"), Ordering::Equal);
        assert_eq!(w.compare("カ", "か"), Ordering::Equal);
        assert_ne!(Collation::parse("ja-JP/None").unwrap().compare("カ", "か"), Ordering::Equal);
    }

    #[test]
    fn digits_before_letters() {
        let c = Collation::default();
        assert_eq!(c.compare("9", "a"), Ordering::Less);
        assert_eq!(c.compare(" ", "0"), Ordering::Less);
    }

    #[test]
    fn prefix_matching() {
        let c = Collation::default();
        assert!(c.starts_with("Johnny", "john"));
        assert!(!c.starts_with("Jo", "john"));
        assert_eq!(c.prefix_cmp("Jane", "jo"), Ordering::Less);
        assert_eq!(c.prefix_cmp("JOSE", "jo"), Ordering::Equal);
        assert_eq!(c.prefix_cmp("Julia", "jo"), Ordering::Greater);
        assert_eq!(c.prefix_cmp("J", "jo"), Ordering::Less);
        let cs = Collation::parse("en-US/None").unwrap();
        assert!(!cs.starts_with("Johnny", "john"));
        assert_eq!(cs.prefix_cmp("Johnny", "john"), Ordering::Equal);
    }

    #[test]
    fn values_use_collation_for_strings() {
        let c = Collation::default();
        assert_eq!(
            c.compare_values(&Value::from("X"), &Value::from("x")),
            Ordering::Equal
        );
        assert_eq!(
            c.compare_values(&Value::Int32(1), &Value::from("a")),
            Ordering::Less
        );
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in "\\PC{0,12}", b in "\\PC{0,12}") {
            for c in [Collation::default(), Collation::binary(), Collation::parse("fr-FR/IgnoreCase,IgnoreNonSpace").unwrap()] {
                prop_assert_eq!(c.compare(&a, &b), c.compare(&b, &a).reverse());
                prop_assert_eq!(c.compare(&a, &a), Ordering::Equal);
            }
        }

        #[test]
        fn string_is_prefix_of_itself_plus_suffix(a in "[a-zA-Z]{0,6}", b in "[a-z]{0,6}") {
            let c = Collation::default();
            let joined = format!("{a}{b}");
            prop_assert!(c.starts_with(&joined, &a));
            prop_assert_eq!(c.prefix_cmp(&joined, &a), Ordering::Equal);
        }
    }
}
