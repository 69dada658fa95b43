//! Reply gate - decides whether the agent answers a message at all.

use rand::Rng;

use super::message::ChatConfig;

/// Decide whether to reply, drawing from the thread-local RNG.
pub fn should_reply(text: &str, chat: &ChatConfig, invoker_handle: &str, agent_handle: &str) -> bool {
    should_reply_with(text, chat, invoker_handle, agent_handle, &mut rand::thread_rng())
}

/// Decide whether to reply using the given RNG.
///
/// Requires non-empty text and an invoker other than the agent itself, and
/// then any of: a private chat, an `@handle` mention, or a chance draw.
/// A chance of 100 always passes and 0 never does, without drawing.
pub fn should_reply_with<R: Rng>(
    text: &str,
    chat: &ChatConfig,
    invoker_handle: &str,
    agent_handle: &str,
    rng: &mut R,
) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }

    let agent = normalize_handle(agent_handle);
    if !agent.is_empty() && normalize_handle(invoker_handle).eq_ignore_ascii_case(agent) {
        return false;
    }

    chat.is_private || is_mentioned(text, agent) || roll(chat.reply_chance, rng)
}

fn roll<R: Rng>(chance: u8, rng: &mut R) -> bool {
    match chance {
        0 => false,
        c if c >= 100 => true,
        c => rng.gen_range(0.0..=100.0) <= f64::from(c),
    }
}

fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

fn is_mentioned(text: &str, agent: &str) -> bool {
    if agent.is_empty() {
        return false;
    }
    let mention = format!("@{}", agent.to_lowercase());
    text.to_lowercase().contains(&mention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn group(chance: u8) -> ChatConfig {
        ChatConfig {
            is_private: false,
            reply_chance: chance,
        }
    }

    fn private() -> ChatConfig {
        ChatConfig {
            is_private: true,
            reply_chance: 0,
        }
    }

    #[test]
    fn test_empty_text_never_replies() {
        assert!(!should_reply("   ", &private(), "alice", "bot"));
        assert!(!should_reply("", &group(100), "alice", "bot"));
    }

    #[test]
    fn test_never_replies_to_itself() {
        assert!(!should_reply("hello", &private(), "bot", "bot"));
        assert!(!should_reply("hello", &private(), "@Bot", "bot"));
    }

    #[test]
    fn test_private_chat_always_replies() {
        assert!(should_reply("hello", &private(), "alice", "bot"));
    }

    #[test]
    fn test_mention_replies_in_group() {
        assert!(should_reply("hey @Bot what's up", &group(0), "alice", "bot"));
        assert!(!should_reply("hey bot what's up", &group(0), "alice", "bot"));
    }

    #[test]
    fn test_zero_chance_never_replies_unaddressed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(!should_reply_with("hello", &group(0), "alice", "bot", &mut rng));
        }
    }

    #[test]
    fn test_full_chance_always_replies() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(should_reply_with("hello", &group(100), "alice", "bot", &mut rng));
        }
    }

    #[test]
    fn test_partial_chance_sometimes_replies() {
        let mut rng = StdRng::seed_from_u64(42);
        let replies = (0..1000)
            .filter(|_| should_reply_with("hello", &group(50), "alice", "bot", &mut rng))
            .count();
        assert!(replies > 350 && replies < 650, "got {replies}");
    }
}
