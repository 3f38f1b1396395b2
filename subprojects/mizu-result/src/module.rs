//! Horizon OS error modules.
//!
//! Reference: <https://switchbrew.org/wiki/Error_codes>

/// Module that produced a [`ResultCode`](crate::ResultCode).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorModule {
    Common = 0,
    Kernel = 1,
    Fs = 2,
    Os = 3,
    Htcs = 4,
    Ncm = 5,
    Dd = 6,
    Lr = 8,
    Ldr = 9,
    Sf = 10,
    Hipc = 11,
    Dmnt = 13,
    Pm = 15,
    Ns = 16,
    Htc = 18,
    Sm = 21,
    Ro = 22,
    Sdmmc = 24,
    Ovln = 25,
    Spl = 26,
    Ethc = 100,
    I2c = 101,
    Gpio = 102,
    Uart = 103,
    Settings = 105,
    Nifm = 110,
    Pwm = 111,
    Display = 114,
    Ntc = 116,
    Fgm = 117,
    Pcie = 120,
    Friends = 121,
    Bcat = 122,
    Ssl = 123,
    Account = 124,
    News = 125,
    Mii = 126,
    Nfc = 127,
    Am = 128,
    PlayReport = 129,
    Ahid = 130,
    Qlaunch = 132,
    Pcv = 133,
    Omm = 134,
    Bpc = 135,
    Psm = 136,
    Nim = 137,
    Psc = 138,
    Tc = 139,
    Usb = 140,
    Nsd = 141,
    Pctl = 142,
    Btm = 143,
    La = 144,
    Eticket = 145,
    Ngc = 146,
    Erpt = 147,
    Apm = 148,
    Cec = 149,
    Profiler = 150,
    ErrorUpload = 151,
    Audio = 153,
    Npns = 154,
    NpnsHttp = 155,
    Arp = 157,
    Swkbd = 158,
    Boot = 159,
    NfcMifare = 161,
    UserlandAssert = 162,
    Fatal = 163,
    NimShop = 164,
    Spsm = 165,
    Bgtc = 167,
    UserlandCrash = 168,
    Srepo = 180,
    Dauth = 181,
    Hid = 202,
    Ldn = 203,
    Irsensor = 205,
    Capture = 206,
    Manu = 208,
    Atk = 209,
    Grc = 212,
    Migration = 216,
    MigrationLdcServ = 217,
    GeneralWebApplet = 800,
    WifiWebAuthApplet = 809,
    WhitelistedApplet = 810,
    ShopN = 811,
}

impl ErrorModule {
    /// Converts a raw module number into a known module.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Common,
            1 => Self::Kernel,
            2 => Self::Fs,
            3 => Self::Os,
            4 => Self::Htcs,
            5 => Self::Ncm,
            6 => Self::Dd,
            8 => Self::Lr,
            9 => Self::Ldr,
            10 => Self::Sf,
            11 => Self::Hipc,
            13 => Self::Dmnt,
            15 => Self::Pm,
            16 => Self::Ns,
            18 => Self::Htc,
            21 => Self::Sm,
            22 => Self::Ro,
            24 => Self::Sdmmc,
            25 => Self::Ovln,
            26 => Self::Spl,
            100 => Self::Ethc,
            101 => Self::I2c,
            102 => Self::Gpio,
            103 => Self::Uart,
            105 => Self::Settings,
            110 => Self::Nifm,
            111 => Self::Pwm,
            114 => Self::Display,
            116 => Self::Ntc,
            117 => Self::Fgm,
            120 => Self::Pcie,
            121 => Self::Friends,
            122 => Self::Bcat,
            123 => Self::Ssl,
            124 => Self::Account,
            125 => Self::News,
            126 => Self::Mii,
            127 => Self::Nfc,
            128 => Self::Am,
            129 => Self::PlayReport,
            130 => Self::Ahid,
            132 => Self::Qlaunch,
            133 => Self::Pcv,
            134 => Self::Omm,
            135 => Self::Bpc,
            136 => Self::Psm,
            137 => Self::Nim,
            138 => Self::Psc,
            139 => Self::Tc,
            140 => Self::Usb,
            141 => Self::Nsd,
            142 => Self::Pctl,
            143 => Self::Btm,
            144 => Self::La,
            145 => Self::Eticket,
            146 => Self::Ngc,
            147 => Self::Erpt,
            148 => Self::Apm,
            149 => Self::Cec,
            150 => Self::Profiler,
            151 => Self::ErrorUpload,
            153 => Self::Audio,
            154 => Self::Npns,
            155 => Self::NpnsHttp,
            157 => Self::Arp,
            158 => Self::Swkbd,
            159 => Self::Boot,
            161 => Self::NfcMifare,
            162 => Self::UserlandAssert,
            163 => Self::Fatal,
            164 => Self::NimShop,
            165 => Self::Spsm,
            167 => Self::Bgtc,
            168 => Self::UserlandCrash,
            180 => Self::Srepo,
            181 => Self::Dauth,
            202 => Self::Hid,
            203 => Self::Ldn,
            205 => Self::Irsensor,
            206 => Self::Capture,
            208 => Self::Manu,
            209 => Self::Atk,
            212 => Self::Grc,
            216 => Self::Migration,
            217 => Self::MigrationLdcServ,
            800 => Self::GeneralWebApplet,
            809 => Self::WifiWebAuthApplet,
            810 => Self::WhitelistedApplet,
            811 => Self::ShopN,
            _ => return None,
        })
    }
}

/// Values usable as the description half of a result code.
pub trait IntoDescription {
    fn into_value(self) -> u32;
}

impl IntoDescription for u32 {
    fn into_value(self) -> u32 {
        self
    }
}

impl IntoDescription for u16 {
    fn into_value(self) -> u32 {
        self as u32
    }
}
