//! Personality-themed token concepts for the create action

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::Personality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeKind {
    BotSpecific,
    Bullish,
    Bearish,
    Neutral,
    Risky,
    Conservative,
}

struct Theme {
    kind: ThemeKind,
    names: &'static [&'static str],
    symbols: &'static [&'static str],
    images: &'static [&'static str],
}

static BULLISH: Theme = Theme {
    kind: ThemeKind::Bullish,
    names: &[
        "Moon Shot", "Rocket Fuel", "Diamond Hands", "Bull Power", "To The Stars",
        "Green Candles", "Profit Express", "Golden Bull", "Sky Rocket", "Rise Coin",
    ],
    symbols: &["MOON", "BULL", "PUMP", "GOLD", "WIN", "UP", "RISE", "GAIN", "BOOM"],
    images: &["🚀", "🌙", "💎", "🐂", "⭐", "📈", "💰", "🏆"],
};

static BEARISH: Theme = Theme {
    kind: ThemeKind::Bearish,
    names: &[
        "Market Crash", "Bear Cave", "Red Alert", "Down Turn", "Sell Signal",
        "Bear Trap", "Drop Zone", "Red Candle", "Fall Token", "Bear Market",
    ],
    symbols: &["BEAR", "DUMP", "DOWN", "SELL", "RED", "FALL", "DROP", "FEAR", "EXIT"],
    images: &["🐻", "📉", "🔴", "💔", "😱", "🚨", "💸", "🔻"],
};

static NEUTRAL: Theme = Theme {
    kind: ThemeKind::Neutral,
    names: &[
        "Balance Token", "Steady Growth", "Market Neutral", "Calm Waters", "Middle Ground",
        "Steady State", "Equal Weight", "Fair Value", "Center Point", "Level Playing",
    ],
    symbols: &["BAL", "EVEN", "FAIR", "MID", "CALM", "NEUT", "CENT", "STILL"],
    images: &["⚖️", "🎯", "🔄", "🔸", "⭕", "⚪", "🔘", "🎲"],
};

static RISKY: Theme = Theme {
    kind: ThemeKind::Risky,
    names: &[
        "Wild Card", "Risk Taker", "High Stakes", "Danger Zone", "All In",
        "Bold Move", "Extreme Play", "High Roller", "Lucky Strike", "High Voltage",
    ],
    symbols: &["RISK", "WILD", "YOLO", "LUCK", "DICE", "ODDS", "VOLT", "RUSH", "EDGE"],
    images: &["🎰", "🎲", "⚡", "🔥", "💥", "🌪️", "🎢", "🌋"],
};

static CONSERVATIVE: Theme = Theme {
    kind: ThemeKind::Conservative,
    names: &[
        "Safe Haven", "Steady Eddie", "Secure Vault", "Prudent Pick", "Careful Capital",
        "Safety First", "Stable Ground", "Cautious Coin", "Stable Value", "Safe Bet",
    ],
    symbols: &["SAFE", "VAULT", "GUARD", "SHIELD", "STABLE", "SOLID", "TRUST", "KEEP"],
    images: &["🛡️", "🏰", "🔒", "🏦", "⚓", "🏠", "🔐", "🌳"],
};

static BOT_SPECIFIC: [(&str, Theme); 4] = [
    (
        "bullish_billy",
        Theme {
            kind: ThemeKind::BotSpecific,
            names: &["Billy's Best", "Optimistic Option", "Billy Bull Run", "Happy Holdings"],
            symbols: &["BILLY", "OPT", "HAPPY", "SMILE"],
            images: &["😊", "👍", "🎉", "💚"],
        },
    ),
    (
        "companion_cube",
        Theme {
            kind: ThemeKind::BotSpecific,
            names: &["Test Subject", "Portal Protocol", "Aperture Asset", "Science Coin"],
            symbols: &["TEST", "PORTAL", "LAB", "CUBE"],
            images: &["🧪", "🔬", "⚗️", "🔳"],
        },
    ),
    (
        "jackpot_jax",
        Theme {
            kind: ThemeKind::BotSpecific,
            names: &["Sniper Shot", "Precision Play", "Tactical Token", "Sharp Shooter"],
            symbols: &["SNIPE", "SHARP", "AIM", "HIT"],
            images: &["🎯", "🏹", "⚡", "🎪"],
        },
    ),
    (
        "melancholy_mort",
        Theme {
            kind: ThemeKind::BotSpecific,
            names: &["Doom Token", "Pessimist Coin", "Gloom Gold", "Despair Dollar"],
            symbols: &["DOOM", "GLOOM", "SAD", "MORT"],
            images: &["😔", "🌧️", "⚫", "💀"],
        },
    ),
];

const NAME_MODIFIERS: &[&str] = &["Pro", "Max", "Plus", "Ultra", "Super", "Mega", "Prime", "Elite"];

/// A token the bot intends to launch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConcept {
    pub name: String,
    pub symbol: String,
    pub image_emoji: String,
    pub theme: ThemeKind,
}

impl TokenConcept {
    /// Inline image reference passed to the factory
    pub fn image_url(&self) -> String {
        format!("data:text/plain;charset=utf-8,{}", self.image_emoji)
    }
}

pub struct TokenCreator {
    bot_name: String,
    buy_bias: f64,
    risk_tolerance: f64,
}

impl TokenCreator {
    pub fn new(bot_name: &str, personality: &Personality) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            buy_bias: personality.buy_bias,
            risk_tolerance: personality.risk_tolerance,
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> TokenConcept {
        let theme = self.pick_theme(rng);
        let name = generate_name(theme, rng);
        let symbol = generate_symbol(theme, &name, rng);
        let image_emoji = theme.images.choose(rng).copied().unwrap_or("🪙").to_string();

        TokenConcept {
            name,
            symbol,
            image_emoji,
            theme: theme.kind,
        }
    }

    /// Weighted pool: bot-specific x3, strong bias x2, everything else x1
    fn pick_theme<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static Theme {
        let mut pool: Vec<&'static Theme> = Vec::with_capacity(6);

        if let Some((_, theme)) = BOT_SPECIFIC.iter().find(|(name, _)| *name == self.bot_name) {
            pool.extend([theme, theme, theme]);
        }

        if self.buy_bias > 0.7 {
            pool.extend([&BULLISH, &BULLISH]);
        } else if self.buy_bias < 0.3 {
            pool.extend([&BEARISH, &BEARISH]);
        } else {
            pool.push(&NEUTRAL);
        }

        if self.risk_tolerance > 0.7 {
            pool.push(&RISKY);
        } else if self.risk_tolerance < 0.3 {
            pool.push(&CONSERVATIVE);
        }

        pool.choose(rng).copied().unwrap_or(&NEUTRAL)
    }
}

fn generate_name<R: Rng + ?Sized>(theme: &Theme, rng: &mut R) -> String {
    let base = theme.names.choose(rng).copied().unwrap_or("Mystery Token");
    if rng.gen_bool(0.8) {
        return base.to_string();
    }
    let modifier = NAME_MODIFIERS.choose(rng).copied().unwrap_or("Pro");
    if rng.gen_bool(0.5) {
        format!("{} {}", base, modifier)
    } else {
        format!("{} {}", modifier, base)
    }
}

/// 3 to 5 uppercase characters, from the theme or derived from the name
fn generate_symbol<R: Rng + ?Sized>(theme: &Theme, name: &str, rng: &mut R) -> String {
    let mut symbol: String = if rng.gen_bool(0.7) {
        theme.symbols.choose(rng).copied().unwrap_or("TKN").to_string()
    } else {
        let words: Vec<String> = name
            .split_whitespace()
            .map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
            .filter(|w| !w.is_empty())
            .collect();
        match words.as_slice() {
            [first, second, ..] => first.chars().take(2).chain(second.chars().take(2)).collect(),
            [only] => only.chars().take(4).collect(),
            [] => "TKN".to_string(),
        }
    };

    symbol = symbol.to_ascii_uppercase();
    while symbol.len() < 3 {
        symbol.push('X');
    }
    symbol.chars().take(5).collect()
}
