//! `Aviroen.Voidsent_RandomDialogue` trigger action
//!
//! Syntax: `Aviroen.Voidsent_RandomDialogue <ModID> <NPC> <tokenBase> <suffix options>`,
//! for example `... author.testmod Maru test. 1,2, OtherKey`. The options
//! may contain spaces; they are split on commas only.

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;
use tracing::debug;

use crate::overrides::{KeyResolver, StringTable};

pub const ACTION_NAME: &str = "Aviroen.Voidsent_RandomDialogue";
pub const SET_DIALOGUE_ACTION: &str = "Spiderbuttons.BETAS_SetNewDialogue";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    #[error("Invalid number of arguments ({0})")]
    TooFewArguments(usize),

    #[error("Invalid content pack or mod ID {0}")]
    UnknownMod(String),
}

/// Translations of every loaded mod, by mod id.
#[derive(Debug, Clone, Default)]
pub struct TranslationRegistry {
    mods: BTreeMap<String, StringTable>,
}

impl TranslationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mod_id: impl Into<String>, translations: StringTable) {
        self.mods.insert(mod_id.into(), translations);
    }

    pub fn get(&self, mod_id: &str) -> Option<&StringTable> {
        self.mods.get(mod_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomDialogueAction {
    pub mod_id: String,
    pub npc: String,
    pub token_base: String,
    pub suffixes: Vec<String>,
}

impl RandomDialogueAction {
    /// `args[0]` is the action name itself.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, DialogueError> {
        if args.len() < 5 {
            return Err(DialogueError::TooFewArguments(args.len()));
        }
        let joined = args[4..]
            .iter()
            .map(|arg| arg.as_ref())
            .collect::<Vec<&str>>()
            .join(" ");

        Ok(Self {
            mod_id: args[1].as_ref().to_string(),
            npc: args[2].as_ref().to_string(),
            token_base: args[3].as_ref().to_string(),
            suffixes: joined.split(',').map(|part| part.trim().to_string()).collect(),
        })
    }

    /// Pick a line and build the action that sets it as the NPC's dialogue.
    pub fn run(
        &self,
        registry: &TranslationRegistry,
        rng: &mut impl Rng,
    ) -> Result<String, DialogueError> {
        let translations = registry
            .get(&self.mod_id)
            .ok_or_else(|| DialogueError::UnknownMod(self.mod_id.clone()))?;

        let suffix = self.suffixes.choose(rng).map(String::as_str).unwrap_or_default();
        let key = format!("{}{}", self.token_base, suffix);
        let text = match translations.resolve(&key) {
            Some(text) => text.to_string(),
            None => format!("(no translation:{key})"),
        };
        debug!(npc = %self.npc, %key, "random dialogue selected");

        Ok(format!(
            "{SET_DIALOGUE_ACTION} {} [EscapedText {}]",
            self.npc,
            escape_quotes(&text)
        ))
    }
}

fn escape_quotes(text: &str) -> String {
    text.replace('"', "\\\"")
}
