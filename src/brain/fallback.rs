use std::sync::Arc;

use crate::brain::persona::{render, Persona};
use crate::events::{ChatEvent, ContextSnapshot, Emotion, ReactionTrigger, SpeechItem, TradeKind, TriggerKind};
use crate::random::RandomSource;

const GREETINGS: &[&str] = &["gm", "gn", "hello", "hi", "hey", "yo", "sup", "wagmi"];
const RUG_WORDS: &[&str] = &["rug", "rugged", "rugpull", "scam", "honeypot", "jeet", "jeets"];
const BULL_WORDS: &[&str] = &["moon", "mooning", "bullish", "pump", "pumping", "buy", "ape", "lfg", "send", "green"];
const BEAR_WORDS: &[&str] = &["sell", "dump", "dumping", "bearish", "dead", "rekt", "red", "down"];
const LAUGH_WORDS: &[&str] = &["lol", "lmao", "haha", "lmfao", "kek"];

/// Last resort line when the persona has no templates at all
const STILL_HERE: &str = "Still here, still watching.";

/// What a chat line is about, by simple keyword matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatMood {
    Greeting,
    Rug,
    Bullish,
    Bearish,
    Question,
    Laughing,
    Other,
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn classify_chat(text: &str) -> ChatMood {
    let words = words(text);
    let any = |list: &[&str]| words.iter().any(|w| list.contains(&w.as_str()));

    if any(RUG_WORDS) {
        ChatMood::Rug
    } else if any(GREETINGS) {
        ChatMood::Greeting
    } else if any(BULL_WORDS) {
        ChatMood::Bullish
    } else if any(BEAR_WORDS) {
        ChatMood::Bearish
    } else if text.contains('?') {
        ChatMood::Question
    } else if any(LAUGH_WORDS) {
        ChatMood::Laughing
    } else {
        ChatMood::Other
    }
}

/// Deterministic local commentary used whenever the text collaborator is
/// unavailable. Always returns non-empty text.
pub struct FallbackResponder {
    persona: Persona,
    rng: Arc<dyn RandomSource>,
}

impl FallbackResponder {
    pub fn new(persona: Persona, rng: Arc<dyn RandomSource>) -> Self {
        Self { persona, rng }
    }

    pub fn respond(&self, trigger: &ReactionTrigger) -> SpeechItem {
        let snapshot = &trigger.snapshot;
        let symbol = snapshot
            .market
            .as_ref()
            .map(|m| format!("${}", m.symbol))
            .unwrap_or_else(|| "this one".to_string());
        let reactions = &self.persona.reactions;

        let (templates, emotion, vars): (&[String], Emotion, Vec<(&str, String)>) = match &trigger.kind {
            TriggerKind::LargeTrade { side, quantity } => {
                let amount = vec![("amount", format!("{:.2}", quantity))];
                match side {
                    TradeKind::Buy => (reactions.big_buy.as_slice(), Emotion::Bullish, amount),
                    TradeKind::Sell => (reactions.big_sell.as_slice(), Emotion::Bearish, amount),
                }
            }
            TriggerKind::Pump { change_pct } => (
                reactions.pump.as_slice(),
                Emotion::Shocked,
                vec![("percent", format!("{:.0}", change_pct.abs()))],
            ),
            TriggerKind::Dump { change_pct } => (
                reactions.dump.as_slice(),
                Emotion::Bearish,
                vec![("percent", format!("{:.0}", change_pct.abs()))],
            ),
            TriggerKind::ChatActivity => match snapshot.latest_chat() {
                Some(chat) => return self.chat_reply(chat, snapshot, symbol),
                None => (reactions.chat.as_slice(), Emotion::Neutral, Vec::new()),
            },
            TriggerKind::Periodic => return self.market_commentary(snapshot, symbol),
        };

        let mut vars = vars;
        vars.push(("symbol", symbol));
        self.pick(templates, emotion, &vars)
    }

    fn chat_reply(&self, chat: &ChatEvent, snapshot: &ContextSnapshot, symbol: String) -> SpeechItem {
        let reactions = &self.persona.reactions;
        let direction = match &snapshot.market {
            Some(m) if m.change.h1 < 0.0 => "red",
            Some(_) => "green",
            None => "sideways",
        };
        let vars = [
            ("user", chat.author.clone()),
            ("symbol", symbol),
            ("direction", direction.to_string()),
        ];

        let (templates, emotion) = match classify_chat(&chat.text) {
            ChatMood::Greeting => (&reactions.greeting, Emotion::Neutral),
            ChatMood::Rug => (&reactions.rug_talk, Emotion::Skeptical),
            ChatMood::Bullish => (&reactions.bullish_chat, Emotion::Bullish),
            ChatMood::Bearish => (&reactions.bearish_chat, Emotion::Skeptical),
            ChatMood::Question => (&reactions.question, Emotion::Neutral),
            ChatMood::Laughing => (&reactions.chat, Emotion::Laughing),
            ChatMood::Other => (&reactions.chat, Emotion::Neutral),
        };
        self.pick(templates, emotion, &vars)
    }

    fn market_commentary(&self, snapshot: &ContextSnapshot, symbol: String) -> SpeechItem {
        let reactions = &self.persona.reactions;
        let Some(market) = &snapshot.market else {
            return self.catchphrase(Emotion::Neutral);
        };

        match self.rng.pick(3) {
            0 => {
                let h1 = market.change.h1;
                let (templates, emotion) = if h1 >= 0.0 {
                    (&reactions.market_up, Emotion::Bullish)
                } else {
                    (&reactions.market_down, Emotion::Skeptical)
                };
                let vars = [("symbol", symbol), ("percent", format!("{:.1}", h1.abs()))];
                self.pick(templates, emotion, &vars)
            }
            1 => {
                let vars = [
                    ("symbol", symbol),
                    ("volume", format!("{:.0}", market.volume_24h / 1000.0)),
                ];
                self.pick(&reactions.volume, Emotion::Neutral, &vars)
            }
            _ => self.catchphrase(Emotion::Neutral),
        }
    }

    fn catchphrase(&self, emotion: Emotion) -> SpeechItem {
        let phrases = &self.persona.catchphrases;
        let text = phrases
            .get(self.rng.pick(phrases.len()))
            .filter(|p| !p.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| STILL_HERE.to_string());
        SpeechItem::new(text, emotion)
    }

    fn pick(&self, templates: &[String], emotion: Emotion, vars: &[(&str, String)]) -> SpeechItem {
        match templates.get(self.rng.pick(templates.len())) {
            Some(template) if !template.trim().is_empty() => SpeechItem::new(render(template, vars), emotion),
            _ => self.catchphrase(emotion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::persona::Reactions;
    use crate::events::{MarketSnapshot, PriceChange};
    use crate::random::FixedRandom;
    use chrono::Utc;

    fn responder() -> FallbackResponder {
        FallbackResponder::new(Persona::default(), Arc::new(FixedRandom(0.0)))
    }

    fn trigger(kind: TriggerKind, snapshot: ContextSnapshot) -> ReactionTrigger {
        ReactionTrigger { kind, snapshot }
    }

    fn with_chat(text: &str) -> ContextSnapshot {
        ContextSnapshot {
            chats: vec![ChatEvent::new("degen42", text, Utc::now(), 100).unwrap()],
            ..ContextSnapshot::default()
        }
    }

    fn market() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "PHIL".to_string(),
            address: "mint".to_string(),
            price: 0.0001,
            market_cap: 70_000.0,
            change: PriceChange {
                m5: 1.0,
                h1: -4.2,
                h24: 9.0,
            },
            volume_24h: 327_000.0,
            liquidity: 23_000.0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify_chat() {
        assert_eq!(classify_chat("gm frens"), ChatMood::Greeting);
        assert_eq!(classify_chat("is this a rug?"), ChatMood::Rug);
        assert_eq!(classify_chat("LFG to the MOON"), ChatMood::Bullish);
        assert_eq!(classify_chat("everyone sell now"), ChatMood::Bearish);
        assert_eq!(classify_chat("what's the dev doing?"), ChatMood::Question);
        assert_eq!(classify_chat("lmao"), ChatMood::Laughing);
        assert_eq!(classify_chat("interesting"), ChatMood::Other);
        // whole words only
        assert_eq!(classify_chat("this is thin"), ChatMood::Other);
    }

    #[test]
    fn test_large_trade_mentions_amount() {
        let item = responder().respond(&trigger(
            TriggerKind::LargeTrade {
                side: TradeKind::Buy,
                quantity: 1.5,
            },
            ContextSnapshot::default(),
        ));
        assert!(item.text.contains("1.50"));
        assert_eq!(item.emotion, Emotion::Bullish);

        let sell = responder().respond(&trigger(
            TriggerKind::LargeTrade {
                side: TradeKind::Sell,
                quantity: 2.0,
            },
            ContextSnapshot::default(),
        ));
        assert_eq!(sell.emotion, Emotion::Bearish);
    }

    #[test]
    fn test_dump_percent_is_positive() {
        let item = responder().respond(&trigger(TriggerKind::Dump { change_pct: -22.4 }, ContextSnapshot::default()));
        assert!(item.text.contains("22"));
        assert!(!item.text.contains("-22"));
    }

    #[test]
    fn test_greeting_names_the_user() {
        let item = responder().respond(&trigger(TriggerKind::ChatActivity, with_chat("gm")));
        assert!(item.text.contains("degen42"));
    }

    #[test]
    fn test_rug_talk_is_skeptical() {
        let item = responder().respond(&trigger(TriggerKind::ChatActivity, with_chat("dev is gonna rug")));
        assert_eq!(item.emotion, Emotion::Skeptical);
    }

    #[test]
    fn test_periodic_without_market_uses_catchphrase() {
        let item = responder().respond(&trigger(TriggerKind::Periodic, ContextSnapshot::default()));
        assert!(Persona::default().catchphrases.contains(&item.text));
    }

    #[test]
    fn test_periodic_market_line() {
        let snapshot = ContextSnapshot {
            market: Some(market()),
            ..ContextSnapshot::default()
        };
        let item = responder().respond(&trigger(TriggerKind::Periodic, snapshot));
        assert!(item.text.contains("$PHIL"));
        assert!(item.text.contains("4.2"));
    }

    #[test]
    fn test_never_empty_with_bare_persona() {
        let persona = Persona {
            catchphrases: Vec::new(),
            reactions: Reactions {
                big_buy: Vec::new(),
                chat: Vec::new(),
                ..Reactions::default()
            },
            ..Persona::default()
        };
        let responder = FallbackResponder::new(persona, Arc::new(FixedRandom(0.7)));

        let kinds = [
            TriggerKind::LargeTrade {
                side: TradeKind::Buy,
                quantity: 9.0,
            },
            TriggerKind::ChatActivity,
            TriggerKind::Periodic,
        ];
        for kind in kinds {
            let item = responder.respond(&trigger(kind, ContextSnapshot::default()));
            assert!(!item.text.trim().is_empty());
        }
    }
}
