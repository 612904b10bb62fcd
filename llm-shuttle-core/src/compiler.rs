//! Diagnostic parse of Rust code blocks with `syn`.
//!
//! A block that parses is summarised as an indented outline of its items;
//! one that doesn't yields the parser's messages. Neither outcome affects
//! whether the block is written to disk.

use quote::ToTokens;
use syn::{ImplItem, Item, TraitItem};

use crate::contract::{Compiler, ParseOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct SynCompiler;

impl Compiler for SynCompiler {
    fn parse(&self, source: &str) -> ParseOutcome {
        match syn::parse_file(source) {
            Ok(file) => {
                let mut tree = String::new();
                outline_items(&file.items, 0, &mut tree);
                ParseOutcome::Parsed {
                    tree: tree.trim_end().to_string(),
                }
            }
            Err(err) => ParseOutcome::Diagnostics(err.into_iter().map(|e| e.to_string()).collect()),
        }
    }
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(line);
    out.push('\n');
}

fn outline_items(items: &[Item], depth: usize, out: &mut String) {
    for item in items {
        match item {
            Item::Fn(f) => push_line(out, depth, &format!("fn {}", f.sig.ident)),
            Item::Struct(s) => push_line(out, depth, &format!("struct {}", s.ident)),
            Item::Enum(e) => push_line(out, depth, &format!("enum {} ({} variants)", e.ident, e.variants.len())),
            Item::Const(c) => push_line(out, depth, &format!("const {}", c.ident)),
            Item::Static(s) => push_line(out, depth, &format!("static {}", s.ident)),
            Item::Type(t) => push_line(out, depth, &format!("type {}", t.ident)),
            Item::Use(u) => push_line(out, depth, &format!("use {}", u.tree.to_token_stream())),
            Item::Macro(m) => push_line(out, depth, &format!("macro {}!", m.mac.path.to_token_stream())),
            Item::Mod(m) => {
                push_line(out, depth, &format!("mod {}", m.ident));
                if let Some((_, content)) = &m.content {
                    outline_items(content, depth + 1, out);
                }
            }
            Item::Trait(t) => {
                push_line(out, depth, &format!("trait {}", t.ident));
                for member in &t.items {
                    if let TraitItem::Fn(f) = member {
                        push_line(out, depth + 1, &format!("fn {}", f.sig.ident));
                    }
                }
            }
            Item::Impl(i) => {
                let header = match &i.trait_ {
                    Some((_, path, _)) => format!(
                        "impl {} for {}",
                        path.to_token_stream(),
                        i.self_ty.to_token_stream()
                    ),
                    None => format!("impl {}", i.self_ty.to_token_stream()),
                };
                push_line(out, depth, &header);
                for member in &i.items {
                    match member {
                        ImplItem::Fn(f) => push_line(out, depth + 1, &format!("fn {}", f.sig.ident)),
                        ImplItem::Const(c) => push_line(out, depth + 1, &format!("const {}", c.ident)),
                        ImplItem::Type(t) => push_line(out, depth + 1, &format!("type {}", t.ident)),
                        _ => {}
                    }
                }
            }
            _ => push_line(out, depth, "item"),
        }
    }
}
