//! Application language priority tables and language codes.

use core::fmt;

use mizu_service::wire_enum;
use static_assertions::const_assert_eq;

wire_enum! {
    /// Language an application can be localized in.
    pub enum ApplicationLanguage {
        AmericanEnglish = 0,
        BritishEnglish = 1,
        Japanese = 2,
        French = 3,
        German = 4,
        LatinAmericanSpanish = 5,
        Spanish = 6,
        Italian = 7,
        Dutch = 8,
        CanadianFrench = 9,
        Portuguese = 10,
        Russian = 11,
        Korean = 12,
        TraditionalChinese = 13,
        SimplifiedChinese = 14,
        BrazilianPortuguese = 15,
    }
}

/// Number of [`ApplicationLanguage`] values.
pub const APPLICATION_LANGUAGE_COUNT: usize = 16;

/// Length of every priority list.
pub const PRIORITY_LIST_LEN: usize = 15;

pub type PriorityList = [ApplicationLanguage; PRIORITY_LIST_LEN];

use ApplicationLanguage::{
    AmericanEnglish as AmE, BrazilianPortuguese as PtBr, BritishEnglish as EnGb,
    CanadianFrench as FrCa, Dutch as Nl, French as Fr, German as De, Italian as It,
    Japanese as Ja, Korean as Ko, LatinAmericanSpanish as Es419, Portuguese as Pt,
    Russian as Ru, SimplifiedChinese as ZhHans, Spanish as Es, TraditionalChinese as ZhHant,
};

const PRIORITY_LISTS: [PriorityList; APPLICATION_LANGUAGE_COUNT] = [
    [AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [EnGb, AmE, Ja, Fr, De, Es, Es419, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [Ja, AmE, EnGb, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [Fr, FrCa, EnGb, AmE, Ja, De, Es, Es419, It, Nl, Pt, Ru, Ko, ZhHans, ZhHant],
    [De, EnGb, AmE, Ja, Fr, Es, Es419, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [Es419, Es, AmE, EnGb, Ja, Fr, De, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [Es, Es419, EnGb, AmE, Ja, Fr, De, It, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [It, EnGb, AmE, Ja, Fr, De, Es, Es419, Nl, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [Nl, EnGb, AmE, Ja, Fr, De, Es, Es419, It, FrCa, Pt, Ru, Ko, ZhHans, ZhHant],
    [FrCa, Fr, AmE, EnGb, Ja, De, Es419, Es, It, Nl, Pt, Ru, Ko, ZhHans, ZhHant],
    [Pt, PtBr, EnGb, AmE, Ja, Fr, De, Es, Es419, It, Nl, FrCa, Ru, Ko, ZhHans],
    [Ru, EnGb, AmE, Ja, Fr, De, Es, Es419, It, Nl, FrCa, Pt, Ko, ZhHans, ZhHant],
    [Ko, AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, ZhHans, ZhHant],
    [ZhHant, ZhHans, AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, Ko],
    [ZhHans, ZhHant, AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, Ko],
    [PtBr, Pt, AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Ru, Ko, ZhHans],
];

impl ApplicationLanguage {
    pub const ALL: [Self; APPLICATION_LANGUAGE_COUNT] = [
        AmE, EnGb, Ja, Fr, De, Es419, Es, It, Nl, FrCa, Pt, Ru, Ko, ZhHant, ZhHans, PtBr,
    ];

    /// Languages to try, in order, when `self` is the system language.
    #[inline]
    pub const fn priority_list(self) -> &'static PriorityList {
        &PRIORITY_LISTS[self as usize]
    }

    /// Bit of this language in a supported-language mask.
    #[inline]
    pub const fn supported_flag(self) -> u32 {
        1 << self as u32
    }

    pub const fn language_code(self) -> LanguageCode {
        match self {
            AmE => LanguageCode::EN_US,
            EnGb => LanguageCode::EN_GB,
            Ja => LanguageCode::JA,
            Fr => LanguageCode::FR,
            De => LanguageCode::DE,
            Es419 => LanguageCode::ES_419,
            Es => LanguageCode::ES,
            It => LanguageCode::IT,
            Nl => LanguageCode::NL,
            FrCa => LanguageCode::FR_CA,
            Pt => LanguageCode::PT,
            Ru => LanguageCode::RU,
            Ko => LanguageCode::KO,
            ZhHant => LanguageCode::ZH_HANT,
            ZhHans => LanguageCode::ZH_HANS,
            PtBr => LanguageCode::PT_BR,
        }
    }

    pub fn from_language_code(code: LanguageCode) -> Option<Self> {
        let lang = match code {
            LanguageCode::EN_US => AmE,
            LanguageCode::EN_GB => EnGb,
            LanguageCode::JA => Ja,
            LanguageCode::FR => Fr,
            LanguageCode::DE => De,
            LanguageCode::ES_419 => Es419,
            LanguageCode::ES => Es,
            LanguageCode::IT => It,
            LanguageCode::NL => Nl,
            LanguageCode::FR_CA => FrCa,
            LanguageCode::PT => Pt,
            LanguageCode::RU => Ru,
            LanguageCode::KO => Ko,
            LanguageCode::ZH_TW | LanguageCode::ZH_HANT => ZhHant,
            LanguageCode::ZH_CN | LanguageCode::ZH_HANS => ZhHans,
            LanguageCode::PT_BR => PtBr,
            _ => return None,
        };
        Some(lang)
    }
}

/// Picks the language an application should run in.
///
/// Walks the priority list of `current` and returns the first language whose
/// flag is in `supported_mask`. An empty mask selects the head of the list.
pub fn get_desired_language(current: ApplicationLanguage, supported_mask: u32) -> ApplicationLanguage {
    let list = current.priority_list();
    if supported_mask == 0 {
        return list[0];
    }
    list.iter()
        .copied()
        .find(|lang| supported_mask & lang.supported_flag() == lang.supported_flag())
        .unwrap_or(current)
}

/// A NUL-padded language tag, 64 bits on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct LanguageCode([u8; 8]);

const_assert_eq!(size_of::<LanguageCode>(), 8);

impl LanguageCode {
    pub const JA: Self = Self::from_tag("ja");
    pub const EN_US: Self = Self::from_tag("en-US");
    pub const FR: Self = Self::from_tag("fr");
    pub const DE: Self = Self::from_tag("de");
    pub const IT: Self = Self::from_tag("it");
    pub const ES: Self = Self::from_tag("es");
    pub const ZH_CN: Self = Self::from_tag("zh-CN");
    pub const KO: Self = Self::from_tag("ko");
    pub const NL: Self = Self::from_tag("nl");
    pub const PT: Self = Self::from_tag("pt");
    pub const RU: Self = Self::from_tag("ru");
    pub const ZH_TW: Self = Self::from_tag("zh-TW");
    pub const EN_GB: Self = Self::from_tag("en-GB");
    pub const FR_CA: Self = Self::from_tag("fr-CA");
    pub const ES_419: Self = Self::from_tag("es-419");
    pub const ZH_HANS: Self = Self::from_tag("zh-Hans");
    pub const ZH_HANT: Self = Self::from_tag("zh-Hant");
    pub const PT_BR: Self = Self::from_tag("pt-BR");

    /// Packs `tag`, truncating after 7 bytes so the code stays NUL-terminated.
    pub const fn from_tag(tag: &str) -> Self {
        let bytes = tag.as_bytes();
        let mut raw = [0u8; 8];
        let mut i = 0;
        while i < bytes.len() && i < 7 {
            raw[i] = bytes[i];
            i += 1;
        }
        Self(raw)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw.to_le_bytes())
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// The tag, or `""` when the bytes are not UTF-8.
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        core::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl fmt::Debug for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LanguageCode({:?})", self.as_str())
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_priority_lists_start_with_their_language() {
        for lang in ApplicationLanguage::ALL {
            let list = lang.priority_list();
            assert_eq!(list[0], lang);
            let unique: HashSet<_> = list.iter().collect();
            assert_eq!(unique.len(), PRIORITY_LIST_LEN, "{lang:?}");
        }
    }

    #[test]
    fn test_desired_language_follows_priority() {
        let mask = Ja.supported_flag() | Ko.supported_flag();
        assert_eq!(get_desired_language(AmE, mask), Ja);
        assert_eq!(get_desired_language(AmE, 0), AmE);
        assert_eq!(get_desired_language(Ko, mask), Ko);
    }

    #[test]
    fn test_language_code_tags() {
        assert_eq!(LanguageCode::EN_US.as_str(), "en-US");
        assert_eq!(LanguageCode::from_tag("zh-Hant"), LanguageCode::ZH_HANT);
        assert_eq!(LanguageCode::from_tag("es-419").to_raw(), 0x3931_342d_7365);
        assert_eq!(LanguageCode::default().as_str(), "");
    }

    #[test]
    fn test_language_code_mapping() {
        for lang in ApplicationLanguage::ALL {
            assert_eq!(ApplicationLanguage::from_language_code(lang.language_code()), Some(lang));
        }
        assert_eq!(ApplicationLanguage::from_language_code(LanguageCode::ZH_TW), Some(ZhHant));
        assert_eq!(ApplicationLanguage::from_language_code(LanguageCode::ZH_CN), Some(ZhHans));
        assert_eq!(ApplicationLanguage::from_language_code(LanguageCode::from_tag("xx")), None);
    }
}
