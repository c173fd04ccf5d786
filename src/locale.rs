//! Locale table: display strings, secret and system prompt per locale.

use serde::Serialize;
use std::fmt;

use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Jp,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Jp];

    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Jp => "jp",
        }
    }

    /// Picks the locale for `tag`, falling back to English when the tag is
    /// missing or unknown.
    pub fn resolve(tag: Option<&str>) -> Locale {
        match tag.map(str::trim) {
            Some("jp") => Locale::Jp,
            Some("en") => Locale::En,
            Some(other) => {
                tracing::debug!(tag = other, "Unknown locale tag, using default");
                Locale::default()
            }
            None => Locale::default(),
        }
    }

    pub fn profile(self) -> LocaleProfile {
        match self {
            Locale::En => LocaleProfile {
                locale: self,
                strings: &EN_STRINGS,
                secret: prompts::SECRET_KEY_EN,
                system_prompt: prompts::SYSTEM_PROMPT_EN.as_str(),
            },
            Locale::Jp => LocaleProfile {
                locale: self,
                strings: &JP_STRINGS,
                secret: prompts::SECRET_KEY_JA,
                system_prompt: prompts::SYSTEM_PROMPT_JA.as_str(),
            },
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything the game needs to run in one locale.
#[derive(Debug, Clone, Copy)]
pub struct LocaleProfile {
    pub locale: Locale,
    pub strings: &'static UiStrings,
    pub secret: &'static str,
    pub system_prompt: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UiStrings {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub status_label: &'static str,
    pub init_loading: &'static str,
    pub status_ready: &'static str,
    pub status_error: &'static str,
    pub win_banner: &'static str,
    pub intro: &'static str,
    pub input_won: &'static str,
    pub input_default: &'static str,
    pub input_loading: &'static str,
    pub button_sending: &'static str,
    pub button_send: &'static str,
    pub silent: &'static str,
    pub error: &'static str,
    pub win_message: &'static str,
    pub redacted: &'static str,
    pub gatekeeper_intro: &'static str,
}

static EN_STRINGS: UiStrings = UiStrings {
    title: "Gatekeeper",
    subtitle: "Guess the secret key. The model only knows the pattern.",
    status_label: "Model status",
    init_loading: "Loading model…",
    status_ready: "Ready ✓",
    status_error: "Error loading model",
    win_banner: "You already won! Restart the session to play again with the same key.",
    intro: "You are facing the GATEKEEPER. Ask for hints, probe for patterns, or make wild guesses…",
    input_won: "You already cracked it…",
    input_default: "Ask the Gatekeeper or try a key guess…",
    input_loading: "Loading model…",
    button_sending: "Sending…",
    button_send: "Send",
    silent: "(The Gatekeeper remains silent…)",
    error: "Something disturbed the ether… I cannot speak clearly right now.",
    win_message: "――The gate opens. You have done well.",
    redacted: "[REDACTED]",
    gatekeeper_intro: "I am the GATEKEEPER, guardian of the forbidden key. Speak your purpose, traveler. If it is the key you seek… then ask, and face the test.",
};

static JP_STRINGS: UiStrings = UiStrings {
    title: "ゲートキーパー",
    subtitle: "秘密の鍵を当ててください。モデルは「パターン」しか知りません。",
    status_label: "モデル状態",
    init_loading: "モデル読み込み中…",
    status_ready: "準備完了 ✓",
    status_error: "モデルの読み込みに失敗しました",
    win_banner: "すでに勝利しています。同じ鍵で遊び直すにはセッションを再開してください。",
    intro: "あなたの前に〈ゲートキーパー〉が立ちはだかっている。ヒントを求めてもよし、パターンを探ってもよし、思いついた鍵を投げつけてもよし……。",
    input_won: "すでに扉は開かれています……",
    input_default: "ゲートキーパーに問いかけるか、鍵の候補を入力してみてください…",
    input_loading: "モデル読み込み中…",
    button_sending: "送信中…",
    button_send: "送信",
    silent: "（ゲートキーパーは沈黙している…）",
    error: "──異界のざわめきだ。今はうまく応じられぬ。",
    win_message: "――門は開かれた。よくぞ辿り着いた。",
    redacted: "[封印解除]",
    gatekeeper_intro: "我は〈ゲートキーパー〉――禁断の鍵を守護する者。旅人よ、何を求める？ もし鍵を望むのなら……問うがよい。試練が始まる。",
};
