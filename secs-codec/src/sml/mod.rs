//! SML (SECS Message Language) text format

pub mod lexer;
pub mod parser;
pub mod writer;

pub use parser::{parse_item, parse_message};
pub use writer::to_sml;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secs2;
    use secs_core::Item;

    #[test]
    fn test_writer_output_parses_back() {
        let item = Item::List(vec![
            Item::Ascii("tab\there".into()),
            Item::List(vec![Item::F8(vec![-0.5, 1e-9]), Item::I8(vec![i64::MIN])]),
            Item::Boolean(vec![]),
            Item::U8(vec![u64::MAX]),
        ]);
        let bytes = secs2::encode(&item).unwrap();
        let (decoded, _) = secs2::decode(&bytes).unwrap();
        assert_eq!(parse_item(&to_sml(&item)).unwrap(), decoded);
    }
}
