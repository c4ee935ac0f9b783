//! SML output

use secs_core::Item;
use std::fmt::Write;

const INDENT: &str = "  ";

/// Render an item as indented SML
pub fn to_sml(item: &Item) -> String {
    let mut out = String::new();
    write_item(&mut out, item, 0);
    out
}

fn write_item(out: &mut String, item: &Item, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    let _ = write!(out, "<{} [{}]", item.format().sml_name(), item.len());

    match item {
        Item::List(items) => {
            if items.is_empty() {
                out.push('>');
                return;
            }
            for child in items {
                out.push('\n');
                write_item(out, child, depth + 1);
            }
            out.push('\n');
            for _ in 0..depth {
                out.push_str(INDENT);
            }
            out.push('>');
            return;
        }
        Item::Ascii(s) => write_ascii(out, s),
        Item::Binary(v) => v.iter().for_each(|b| {
            let _ = write!(out, " 0x{:02X}", b);
        }),
        Item::Boolean(v) => v.iter().for_each(|&b| {
            out.push_str(if b { " TRUE" } else { " FALSE" });
        }),
        Item::I1(v) => write_values(out, v),
        Item::I2(v) => write_values(out, v),
        Item::I4(v) => write_values(out, v),
        Item::I8(v) => write_values(out, v),
        Item::U1(v) => write_values(out, v),
        Item::U2(v) => write_values(out, v),
        Item::U4(v) => write_values(out, v),
        Item::U8(v) => write_values(out, v),
        Item::F4(v) => write_values(out, v),
        Item::F8(v) => write_values(out, v),
    }
    out.push('>');
}

fn write_values<T: std::fmt::Display>(out: &mut String, values: &[T]) {
    for v in values {
        let _ = write!(out, " {}", v);
    }
}

/// Printable runs are quoted; quotes and control characters become `0xNN`
fn write_ascii(out: &mut String, value: &str) {
    let mut in_run = false;
    for c in value.chars() {
        let printable = (' '..='~').contains(&c) && c != '"';
        if printable {
            if !in_run {
                out.push_str(" \"");
                in_run = true;
            }
            out.push(c);
        } else {
            if in_run {
                out.push('"');
                in_run = false;
            }
            let _ = write!(out, " 0x{:02X}", c as u32);
        }
    }
    if in_run {
        out.push('"');
    }
}
