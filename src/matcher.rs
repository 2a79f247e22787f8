use crate::symbols::SymbolTable;

/// A POI record as read from a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiRecord {
    pub id: String,
    pub adcode: String,
    pub name: String,
}

/// A POI tagged with the first place symbol found in its name.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPoi {
    /// Name with parenthesized runs removed.
    pub name: String,
    pub id: String,
    pub adcode: String,
    pub place_symbol: String,
    pub place_code: i64,
}

/// Finds the earliest place symbol referenced in a POI name.
#[derive(Debug, Clone)]
pub struct SymbolMatcher {
    /// Sorted by symbol; on equal offsets the first in this order wins.
    symbols: Vec<(String, i64)>,
}

impl SymbolMatcher {
    pub fn new(table: &SymbolTable) -> Self {
        let mut symbols = table.entries().to_vec();
        symbols.sort_by(|a, b| a.0.cmp(&b.0));
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol and code with the smallest offset in `cleaned`.
    pub fn find_earliest<'a>(&'a self, cleaned: &str) -> Option<(&'a str, i64)> {
        let mut best: Option<(usize, &'a str, i64)> = None;
        for (sym, code) in &self.symbols {
            if sym.len() > cleaned.len() {
                continue;
            }
            if let Some(pos) = cleaned.find(sym.as_str()) {
                if best.map_or(true, |(p, _, _)| pos < p) {
                    best = Some((pos, sym.as_str(), *code));
                }
            }
        }
        best.map(|(_, sym, code)| (sym, code))
    }

    /// Tag one POI, or `None` when its name references no known symbol.
    pub fn tag(&self, poi: &PoiRecord) -> Option<TaggedPoi> {
        let cleaned = strip_parentheticals(&poi.name);
        let (sym, code) = self.find_earliest(&cleaned)?;
        Some(TaggedPoi {
            place_symbol: sym.to_string(),
            place_code: code,
            name: cleaned,
            id: poi.id.clone(),
            adcode: poi.adcode.clone(),
        })
    }
}

/// Remove every `(...)` run, and the full-width `（...）` form.
///
/// A run ends at the first closing bracket; an opening bracket that is never
/// closed is kept as-is.
pub fn strip_parentheticals(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    let mut i = 0;
    while i < chars.len() {
        let close = match chars[i] {
            '(' => Some(')'),
            '（' => Some('）'),
            _ => None,
        };
        if let Some(close) = close {
            if let Some(offset) = chars[i + 1..].iter().position(|&c| c == close) {
                i += offset + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matcher() -> SymbolMatcher {
        SymbolMatcher::new(&SymbolTable::from_entries(vec![
            ("北京".to_string(), 110000),
            ("海淀".to_string(), 110108),
            ("上海".to_string(), 310000),
            ("京".to_string(), 110000),
            ("沪".to_string(), 310000),
        ]))
    }

    fn poi(name: &str) -> PoiRecord {
        PoiRecord {
            id: "B000A1".into(),
            adcode: "440305".into(),
            name: name.into(),
        }
    }

    #[test]
    fn test_strip_parentheticals() {
        assert_eq!(strip_parentheticals("北京大学(海淀)"), "北京大学");
        assert_eq!(strip_parentheticals("A市(原B)"), "A市");
        assert_eq!(strip_parentheticals("店(一)(二)号"), "店号");
        assert_eq!(strip_parentheticals("店（分店）"), "店");
        assert_eq!(strip_parentheticals("开口(没关"), "开口(没关");
        assert_eq!(strip_parentheticals("(a(b)c)"), "c)");
    }

    #[test]
    fn test_earliest_symbol_wins() {
        let m = matcher();
        let tagged = m.tag(&poi("上海北京菜馆")).unwrap();
        assert_eq!(tagged.place_symbol, "上海");
        assert_eq!(tagged.place_code, 310000);
    }

    #[test]
    fn test_equal_offset_resolved_by_symbol_order() {
        let m = matcher();
        // "京" also matches, one character later
        let tagged = m.tag(&poi("北京饭店")).unwrap();
        assert_eq!(tagged.place_symbol, "北京");

        let tie = SymbolMatcher::new(&SymbolTable::from_entries(vec![
            ("广州".to_string(), 440100),
            ("广".to_string(), 440000),
        ]));
        let tagged = tie.tag(&poi("广州酒家")).unwrap();
        assert_eq!(tagged.place_symbol, "广");
    }

    #[test]
    fn test_parenthetical_content_is_ignored() {
        let m = matcher();
        assert!(m.tag(&poi("便利店(海淀店)")).is_none());
        let with = m.tag(&poi("上海饭店(原北京饭店)")).unwrap();
        let without = m.tag(&poi("上海饭店")).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_no_symbol_drops_poi() {
        let m = matcher();
        assert!(m.tag(&poi("深圳湾公园")).is_none());
        assert!(m.tag(&poi("")).is_none());
    }

    #[test]
    fn test_master_table_to_match() {
        let builder = crate::symbols::SymbolTableBuilder::new(Vec::new());
        let table = builder.build(
            &[(110000, "北京市".to_string()), (110101, "东城区".to_string())],
            &[],
            &[],
        );
        assert_eq!(builder.minimize("北京市"), "北京");

        let tagged = SymbolMatcher::new(&table).tag(&poi("北京大学(海淀)")).unwrap();
        assert_eq!(tagged.place_symbol, "北京");
        assert_eq!(tagged.place_code, 110000);
    }

    #[test]
    fn test_tag_carries_record_fields() {
        let m = matcher();
        let tagged = m.tag(&poi("北京大学(海淀)")).unwrap();
        assert_eq!(
            tagged,
            TaggedPoi {
                name: "北京大学".into(),
                id: "B000A1".into(),
                adcode: "440305".into(),
                place_symbol: "北京".into(),
                place_code: 110000,
            }
        );
    }
}
