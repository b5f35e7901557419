//! Dual-execution command engine.
//!
//! Every command supports two paths over the same arguments: `execute`, the
//! full playback path (resource acquisition, placement, suspended tasks),
//! and `simulate`, the state-only path that performs exactly the persistent
//! mutations `execute` would. Running `simulate` over any prefix of a script
//! and `execute` over the rest must leave the effect registry exactly where
//! `execute` over the whole script would. That equivalence is what makes
//! save/resume and fast-forward cheap; divergence is the one failure this
//! crate treats as fatal.

pub mod effect_commands;
pub mod position;

use log::warn;

use crate::session::Session;

use position::PositionExpr;

/// Which path a dispatch takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Full playback: visuals, suspended tasks, persistent state.
    Execute,
    /// State-only replay: persistent state, synchronously, nothing else.
    Simulate,
}

/// One command implementation, registered under its name.
///
/// `execute` returns whether the command handled its arguments; malformed
/// arguments return `false` having mutated nothing. `simulate` must parse
/// identically and apply only the persistent mutations.
pub trait CommandHandler {
    fn name(&self) -> &str;

    fn execute(&self, args: &str, session: &mut Session) -> bool;

    fn simulate(&self, args: &str, session: &mut Session);
}

/// Parsed form of the shared effect argument grammar:
/// `"<name>[,<positionExpr>][,loop]"`.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectArgs {
    pub name: String,
    pub position: PositionExpr,
    pub looping: bool,
}

/// Parses the effect argument grammar. The trailing `,loop` token is
/// case-insensitive; a missing position expression defaults to anchor `M`.
/// Returns `None` on empty or nameless input so the command reports "not
/// handled" without touching state.
pub fn parse_effect_args(raw: &str) -> Option<EffectArgs> {
    let mut stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let looping = stripped.len() >= 5
        && stripped
            .get(stripped.len() - 5..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(",loop"));
    if looping {
        stripped.truncate(stripped.len() - 5);
    }

    let (name, rest) = match stripped.split_once(',') {
        Some((name, rest)) => (name, rest),
        None => (stripped.as_str(), ""),
    };
    if name.is_empty() {
        return None;
    }
    let position = if rest.is_empty() {
        PositionExpr::Anchor("M".to_string())
    } else {
        position::parse_position(rest)
    };

    Some(EffectArgs {
        name: name.to_string(),
        position,
        looping,
    })
}

/// Logs a rejected dispatch through the shared taxonomy.
pub(crate) fn reject(command: &str, raw: &str) -> bool {
    warn!(
        "{}",
        crate::error::RuntimeError::InvalidArgument {
            command: command.to_string(),
            raw: raw.to_string(),
        }
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use position::Position;

    #[test]
    fn bare_name_defaults_to_center_anchor() {
        let args = parse_effect_args("Snow").expect("name alone parses");
        assert_eq!(args.name, "Snow");
        assert_eq!(args.position, PositionExpr::Anchor("M".to_string()));
        assert!(!args.looping);
    }

    #[test]
    fn loop_token_is_stripped_case_insensitively() {
        let args = parse_effect_args("Snow,L(0,20),LOOP").expect("parses");
        assert!(args.looping);
        assert_eq!(
            args.position,
            PositionExpr::AnchorOffset("L".to_string(), Position::new(0.0, 20.0))
        );
    }

    #[test]
    fn name_with_loop_but_no_position_keeps_the_default() {
        let args = parse_effect_args("Snow,loop").expect("parses");
        assert!(args.looping);
        assert_eq!(args.position, PositionExpr::Anchor("M".to_string()));
    }

    #[test]
    fn absolute_position_survives_its_inner_comma() {
        let args = parse_effect_args("Burst,(100,-50)").expect("parses");
        assert_eq!(
            args.position,
            PositionExpr::Absolute(Position::new(100.0, -50.0))
        );
    }

    #[test]
    fn empty_and_nameless_inputs_are_rejected() {
        assert!(parse_effect_args("").is_none());
        assert!(parse_effect_args("   ").is_none());
        assert!(parse_effect_args(",M").is_none());
        assert!(parse_effect_args(",loop").is_none());
    }
}
