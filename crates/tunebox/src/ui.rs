//! Terminal output helpers: colors and single-letter prompts.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use crossterm::style::{Color, Stylize};

/// Semantic colors used across commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorName {
    TextSuccess,
    TextWarning,
    TextError,
    Action,
    ActionDefault,
    ActionDescription,
}

impl ColorName {
    fn color(self) -> Option<Color> {
        match self {
            ColorName::TextSuccess => Some(Color::Green),
            ColorName::TextWarning => Some(Color::Yellow),
            ColorName::TextError => Some(Color::Red),
            ColorName::Action => Some(Color::Blue),
            ColorName::ActionDefault => Some(Color::DarkCyan),
            ColorName::ActionDescription => None,
        }
    }
}

/// Output settings for the current process.
#[derive(Clone, Copy, Debug)]
pub struct Term {
    color: bool,
}

impl Term {
    /// Color is used only when enabled and stdout is a terminal.
    pub fn new(color_enabled: bool) -> Self {
        Self {
            color: color_enabled && std::io::stdout().is_terminal(),
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn colorize(&self, name: ColorName, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match name.color() {
            Some(color) if name == ColorName::ActionDefault => {
                text.with(color).bold().to_string()
            }
            Some(color) => text.with(color).to_string(),
            None => text.to_string(),
        }
    }

    /// Prompt for one of `options` and return the chosen shortcut letter, lowercased.
    ///
    /// Each option's shortcut is its first uppercase letter, or else its first
    /// letter not already taken. The first option is the default, picked on an
    /// empty answer or end of input.
    pub fn input_options<R, W>(&self, options: &[&str], input: &mut R, out: &mut W) -> Result<char>
    where
        R: BufRead,
        W: Write,
    {
        let mut letters: Vec<char> = Vec::with_capacity(options.len());
        let mut rendered = Vec::with_capacity(options.len());

        for (idx, option) in options.iter().enumerate() {
            let found = option
                .char_indices()
                .find(|(_, c)| c.is_alphabetic() && c.is_uppercase())
                .or_else(|| {
                    option.char_indices().find(|(_, c)| {
                        c.is_alphabetic() && !letters.contains(&c.to_ascii_lowercase())
                    })
                });
            let Some((pos, letter)) = found else {
                anyhow::bail!("no unambiguous shortcut letter for option {option:?}");
            };
            letters.push(letter.to_ascii_lowercase());

            let is_default = idx == 0;
            let shown = if is_default {
                format!("[{}]", letter.to_ascii_uppercase())
            } else {
                letter.to_ascii_uppercase().to_string()
            };
            let descr = if is_default {
                ColorName::ActionDefault
            } else {
                ColorName::ActionDescription
            };
            let letter_color = if is_default {
                ColorName::ActionDefault
            } else {
                ColorName::Action
            };
            let rest = &option[pos + letter.len_utf8()..];
            rendered.push(format!(
                "{}{}{}",
                self.colorize(descr, &option[..pos]),
                self.colorize(letter_color, &shown),
                self.colorize(descr, rest)
            ));
        }

        let Some(&default) = letters.first() else {
            anyhow::bail!("no options to choose from");
        };
        let prompt = format!(
            "{}{}{}",
            self.colorize(ColorName::Action, "\u{279C} "),
            rendered.join(self.colorize(ColorName::ActionDescription, ", ").as_str()),
            self.colorize(ColorName::ActionDescription, "?")
        );
        let fallback = format!(
            "Enter one of {}:",
            letters
                .iter()
                .map(|c| c.to_ascii_uppercase().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        write!(out, "{prompt} ").context("write prompt")?;
        out.flush().context("flush prompt")?;
        loop {
            let mut line = String::new();
            let read = input.read_line(&mut line).context("read answer")?;
            if read == 0 {
                writeln!(out).context("write prompt")?;
                return Ok(default);
            }
            let answer = line.trim().to_lowercase();
            match answer.chars().next() {
                None => return Ok(default),
                Some(c) if letters.contains(&c) => return Ok(c),
                Some(_) => {
                    write!(out, "{fallback} ").context("write prompt")?;
                    out.flush().context("flush prompt")?;
                }
            }
        }
    }
}
