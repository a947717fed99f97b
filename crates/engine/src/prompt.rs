//! Bot profiles and prompt rendering.
//!
//! Every conversation renders through the same path: the context block is
//! included raw, every other message becomes a `sender: content` line, and
//! the whole thing is framed by the profile's turn template. Truncation
//! counts tokens on exactly this text, so the renderer lives here and is
//! shared by assembly, truncation, and digest computation.

use std::collections::BTreeMap;

use chrono::Local;

/// Per-bot prompt configuration.
///
/// A chain may hold conversations with different profiles, so each
/// conversation carries its own copy.
#[derive(Debug, Clone)]
pub struct BotProfile {
    /// Display name; also stripped from reply echoes.
    pub bot_name: String,
    /// Language tag handed to command execution and templates.
    pub language: String,
    /// Persona lines forming the head of the context block.
    pub persona: Vec<String>,
    /// Instruction template appended to the persona; may use `{tools}`.
    pub instructions: String,
    /// Framing lines shown only while the rotating history is below
    /// capacity, to anchor a fresh conversation.
    pub opening: Vec<String>,
    /// Literal text prepended to every rendered prompt.
    pub prefix: String,
    /// Template with `{user_message}` and `{bot_message}` slots.
    pub turn_template: String,
    /// Seed for the `{bot_message}` slot.
    pub bot_message: String,
    /// Extra substitution variables available to all templates.
    pub vars: BTreeMap<String, String>,
    /// Tokens reserved for the model's reply.
    pub max_new_tokens: usize,
    /// Fraction of the context window memory excerpts may occupy.
    pub memory_fraction: f32,
    /// How many memory excerpts to request per prompt.
    pub memory_excerpts: usize,
    /// Whether extracted commands are executed at all.
    pub allow_commands: bool,
}

impl Default for BotProfile {
    fn default() -> Self {
        Self {
            bot_name: "Palaver".into(),
            language: "en".into(),
            persona: Vec::new(),
            instructions: String::new(),
            opening: Vec::new(),
            prefix: String::new(),
            turn_template: "{user_message}\n{bot_name}:{bot_message}".into(),
            bot_message: String::new(),
            vars: BTreeMap::new(),
            max_new_tokens: 512,
            memory_fraction: 0.5,
            memory_excerpts: 10,
            allow_commands: true,
        }
    }
}

impl BotProfile {
    pub fn named(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            ..Self::default()
        }
    }

    /// The substitution set shared by all of this profile's templates.
    fn base_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("bot_name".to_string(), self.bot_name.clone()),
            ("language".to_string(), self.language.clone()),
            ("now".to_string(), current_datetime()),
        ];
        for (key, value) in &self.vars {
            vars.push((key.clone(), value.clone()));
        }
        vars
    }

    /// Build the context block: persona + instructions (with the rendered
    /// tool reference), plus the opening frame while the history has not yet
    /// filled once. A fixed override short-circuits everything.
    pub fn build_context(
        &self,
        fixed: Option<&str>,
        tools_doc: &str,
        below_capacity: bool,
    ) -> String {
        if let Some(fixed) = fixed {
            return fixed.to_string();
        }

        // Substituted first so the tool reference may itself use profile vars.
        let mut vars = vec![("tools".to_string(), tools_doc.to_string())];
        vars.extend(self.base_vars());

        let mut parts = Vec::new();
        let head = render_template(
            &format!("{}{}", self.persona.join("\n"), self.instructions),
            &vars,
        );
        parts.push(head);

        if below_capacity && !self.opening.is_empty() {
            let opening = render_template(&self.opening.join("\n"), &vars);
            if !opening.is_empty() {
                parts.push(opening);
            }
        }

        parts.join("\n")
    }

    /// Render a message sequence to the final prompt text.
    ///
    /// When `includes_context` is set, the first message is taken as the
    /// context block and emitted raw; everything else becomes a
    /// `sender: content` line. The joined lines fill `{user_message}` in the
    /// turn template behind the prefix.
    pub fn render_prompt(
        &self,
        messages: &[palaver_core::ConvMessage],
        includes_context: bool,
    ) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(messages.len());
        let mut rest = messages;

        if includes_context {
            if let Some((context, tail)) = messages.split_first() {
                lines.push(context.content.clone());
                rest = tail;
            }
        }

        for message in rest {
            lines.push(format!("{}: {}", message.sender, message.content));
        }

        let mut vars = self.base_vars();
        vars.push(("bot_message".to_string(), render_template(&self.bot_message, &self.base_vars())));
        vars.push(("user_message".to_string(), lines.join("\n")));

        let template = strip_stop_suffix(&self.turn_template);
        format!("{}{}", self.prefix, render_template(template, &vars))
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are left alone so
/// literal braces in content survive.
pub fn render_template(template: &str, vars: &[(String, String)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        let slot = format!("{{{key}}}");
        if rendered.contains(&slot) {
            rendered = rendered.replace(&slot, value);
        }
    }
    rendered
}

/// Drop trailing whitespace and `</s>` stop markers some turn templates
/// carry for training-time use.
fn strip_stop_suffix(template: &str) -> &str {
    let mut rest = template.trim_end();
    while let Some(stripped) = rest.strip_suffix("</s>") {
        rest = stripped.trim_end();
    }
    rest
}

/// Local wall-clock time rendered for prompts and memory notes.
pub fn current_datetime() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::ConvMessage;

    fn profile() -> BotProfile {
        let mut p = BotProfile::named("Eve");
        p.persona = vec!["You are {bot_name}, a helpful bot.".into()];
        p.instructions = "\n{tools}".into();
        p.opening = vec!["The conversation begins.".into()];
        p
    }

    #[test]
    fn template_substitution_replaces_known_vars() {
        let vars = vec![("bot_name".to_string(), "Eve".to_string())];
        assert_eq!(render_template("Hi {bot_name}!", &vars), "Hi Eve!");
        assert_eq!(render_template("Keep {unknown}", &vars), "Keep {unknown}");
    }

    #[test]
    fn context_includes_opening_only_below_capacity() {
        let p = profile();
        let fresh = p.build_context(None, "tools here", true);
        assert!(fresh.contains("You are Eve"));
        assert!(fresh.contains("tools here"));
        assert!(fresh.contains("The conversation begins."));

        let warmed = p.build_context(None, "tools here", false);
        assert!(!warmed.contains("The conversation begins."));
    }

    #[test]
    fn fixed_context_overrides_templates() {
        let p = profile();
        let ctx = p.build_context(Some("FIXED"), "ignored", true);
        assert_eq!(ctx, "FIXED");
    }

    #[test]
    fn render_prompt_keeps_context_raw_and_prefixes_senders() {
        let p = profile();
        let messages = vec![
            ConvMessage::system("CONTEXT"),
            ConvMessage::user("alice", "hello"),
            ConvMessage::assistant("Eve", "hi alice"),
        ];
        let prompt = p.render_prompt(&messages, true);
        assert!(prompt.starts_with("CONTEXT\nalice: hello\nEve: hi alice"));
        assert!(prompt.ends_with("Eve:"));
    }

    #[test]
    fn render_prompt_without_context_renders_every_line() {
        let p = profile();
        let messages = vec![ConvMessage::user("alice", "hello")];
        let prompt = p.render_prompt(&messages, false);
        assert!(prompt.starts_with("alice: hello"));
    }

    #[test]
    fn stop_markers_are_stripped_from_turn_template() {
        let mut p = profile();
        p.turn_template = "{user_message}\n{bot_name}: </s> ".into();
        let prompt = p.render_prompt(&[ConvMessage::user("a", "x")], false);
        assert!(prompt.ends_with("Eve:"));
    }
}
