//! Terminal rendering of token boundaries.

use crate::tokenizer::ChatTokenizer;
use colored::{Color, Colorize};
use dsproc_core::Result;

/// Background colours, cycled by token position.
pub const COLORS: [Color; 5] = [
    Color::Red,
    Color::Green,
    Color::Blue,
    Color::Yellow,
    Color::Magenta,
];

/// Decode each token on its own and give it the background colour of its
/// position.
pub fn render_tokens<T: ChatTokenizer + ?Sized>(tokens: &[u32], tokenizer: &T) -> Result<String> {
    let mut rendered = String::new();
    for (i, &token) in tokens.iter().enumerate() {
        let text = tokenizer.decode(token)?;
        rendered.push_str(&text.on_color(COLORS[i % COLORS.len()]).to_string());
    }
    Ok(rendered)
}

/// Print [`render_tokens`] to stdout.
pub fn visualize_token<T: ChatTokenizer + ?Sized>(tokens: &[u32], tokenizer: &T) -> Result<()> {
    println!("{}", render_tokens(tokens, tokenizer)?);
    Ok(())
}
