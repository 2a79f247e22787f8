use std::collections::{BTreeMap, HashMap, HashSet};

use polars::prelude::*;

use crate::error::Result;
use crate::schema::{admin, alias, shortname, symbol};
use crate::table::{parse_code, require_columns};

/// Qualifiers for autonomous, special or directly-governed status.
const STATUS_QUALIFIERS: [&str; 4] = ["自治", "特别", "行政", "直辖"];

/// Banner wing qualifiers. The bare "左翼" must come after its longer forms.
const WING_QUALIFIERS: [&str; 7] = [
    "左翼前", "左翼中", "左翼后", "右翼前", "右翼中", "右翼后", "左翼",
];

/// Full names containing this denote a municipal sub-district placeholder.
const SUBDISTRICT_MARKER: &str = "市辖区";

/// One administrative unit before and after minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MainName {
    pub code: i64,
    pub fullname: String,
    pub minimized: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolSource {
    MainName,
    Alias,
    ShortName,
}

/// Place symbol → administrative code dictionary.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Sorted by code, then symbol.
    entries: Vec<(String, i64)>,
    index: HashMap<String, i64>,
}

impl SymbolTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut index: HashMap<String, i64> = HashMap::new();
        for (sym, code) in entries {
            if sym.is_empty() {
                continue;
            }
            index.entry(sym).or_insert(code);
        }
        let mut entries: Vec<(String, i64)> =
            index.iter().map(|(s, c)| (s.clone(), *c)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Self { entries, index }
    }

    /// Load a previously written symbol table frame.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        require_columns(df, &[symbol::PLACESYMBOL, symbol::PLACECODE])?;
        let symbols = df.column(symbol::PLACESYMBOL)?.str()?;
        let codes = df.column(symbol::PLACECODE)?.cast(&DataType::String)?;
        let codes = codes.str()?;
        let entries = symbols
            .into_iter()
            .zip(codes.into_iter())
            .filter_map(|(s, c)| Some((s?.trim().to_string(), parse_code(c?)?)))
            .collect::<Vec<_>>();
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, symbol: &str) -> Option<i64> {
        self.index.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by code ascending.
    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let symbols: Vec<&str> = self.entries.iter().map(|(s, _)| s.as_str()).collect();
        let codes: Vec<i64> = self.entries.iter().map(|(_, c)| *c).collect();
        Ok(DataFrame::new(vec![
            Column::new(symbol::PLACESYMBOL.into(), &symbols),
            Column::new(symbol::PLACECODE.into(), &codes),
        ])?)
    }
}

/// Builds a [`SymbolTable`] from the administrative master table, aliases,
/// short names and the minority-fragment list.
pub struct SymbolTableBuilder {
    /// Longest first, so a fragment never leaves part of a longer one behind.
    minority_fragments: Vec<String>,
}

impl SymbolTableBuilder {
    pub fn new(minority_fragments: impl IntoIterator<Item = String>) -> Self {
        let mut fragments: Vec<String> = minority_fragments
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        fragments.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        Self {
            minority_fragments: fragments,
        }
    }

    /// Reduce a full administrative name to its bare place symbol.
    pub fn minimize(&self, fullname: &str) -> String {
        let mut name = fullname.trim().to_string();
        for fragment in &self.minority_fragments {
            name = name.replace(fragment.as_str(), "");
        }
        for q in STATUS_QUALIFIERS.iter().chain(WING_QUALIFIERS.iter()) {
            name = name.replace(q, "");
        }
        let len = name.chars().count();
        if len > 2 {
            name = name.chars().take(len - 1).collect();
        }
        name
    }

    /// Minimize every master row and resolve symbol collisions.
    ///
    /// Sub-district rows and rows that minimize to nothing are dropped. When
    /// several codes share a symbol, the one with the most trailing zeros
    /// (the highest-level unit) survives, lowest code first on a tie.
    pub fn main_names(&self, master: &[(i64, String)]) -> Vec<MainName> {
        let mut groups: BTreeMap<String, Vec<MainName>> = BTreeMap::new();
        for (code, fullname) in master {
            if fullname.contains(SUBDISTRICT_MARKER) {
                continue;
            }
            let minimized = self.minimize(fullname);
            if minimized.is_empty() {
                continue;
            }
            groups.entry(minimized.clone()).or_default().push(MainName {
                code: *code,
                fullname: fullname.clone(),
                minimized,
            });
        }

        let mut out = Vec::with_capacity(groups.len());
        for (sym, mut rows) in groups {
            rows.sort_by(|a, b| {
                trailing_zeros(b.code)
                    .cmp(&trailing_zeros(a.code))
                    .then_with(|| a.code.cmp(&b.code))
            });
            rows.dedup_by(|a, b| a.code == b.code);
            if rows.len() > 1 {
                tracing::debug!(
                    symbol = %sym,
                    kept = rows[0].code,
                    dropped = rows.len() - 1,
                    "minimized symbol collision"
                );
            }
            if let Some(winner) = rows.into_iter().next() {
                out.push(winner);
            }
        }
        out.sort_by_key(|m| m.code);
        out
    }

    /// Build the full symbol table.
    ///
    /// Main-name symbols take precedence over aliases, aliases over short
    /// names, when the same string appears more than once.
    pub fn build(
        &self,
        master: &[(i64, String)],
        aliases: &[(String, String)],
        short_names: &[(String, i64)],
    ) -> SymbolTable {
        let mains = self.main_names(master);

        let by_fullname: HashMap<&str, i64> =
            mains.iter().map(|m| (m.fullname.as_str(), m.code)).collect();
        let by_minimized: HashMap<&str, i64> =
            mains.iter().map(|m| (m.minimized.as_str(), m.code)).collect();

        let mut unresolved = 0usize;
        let alias_codes: Vec<(String, i64)> = aliases
            .iter()
            .filter_map(|(alias, mainname)| {
                let mainname = mainname.trim();
                let code = by_fullname
                    .get(mainname)
                    .or_else(|| by_minimized.get(mainname))
                    .copied();
                if code.is_none() {
                    unresolved += 1;
                }
                code.map(|c| (alias.trim().to_string(), c))
            })
            .collect();
        if unresolved > 0 {
            tracing::warn!(count = unresolved, "aliases without a resolvable main name dropped");
        }

        let tagged = mains
            .iter()
            .map(|m| (SymbolSource::MainName, m.minimized.clone(), m.code))
            .chain(alias_codes.into_iter().map(|(s, c)| (SymbolSource::Alias, s, c)))
            .chain(
                short_names
                    .iter()
                    .map(|(s, c)| (SymbolSource::ShortName, s.trim().to_string(), *c)),
            );

        let mut seen: HashMap<String, (SymbolSource, i64)> = HashMap::new();
        let mut ordered = Vec::new();
        for (source, sym, code) in tagged {
            match seen.get(&sym) {
                Some((first, kept)) if *kept != code => {
                    tracing::debug!(
                        symbol = %sym,
                        kept = *kept,
                        ignored = code,
                        "{:?} symbol shadowed by {:?}",
                        source,
                        first
                    );
                }
                Some(_) => {}
                None => {
                    seen.insert(sym.clone(), (source, code));
                    ordered.push((sym, code));
                }
            }
        }

        let table = SymbolTable::from_entries(ordered);
        tracing::info!(symbols = table.len(), mains = mains.len(), "symbol table built");
        table
    }
}

fn trailing_zeros(code: i64) -> u32 {
    if code == 0 {
        return 0;
    }
    let mut n = code;
    let mut zeros = 0;
    while n % 10 == 0 {
        zeros += 1;
        n /= 10;
    }
    zeros
}

// ── Frame adapters ──────────────────────────────────────────────────────────

/// `(adcode, fullname)` rows; rows with an unparsable code are dropped.
pub fn master_rows(df: &DataFrame) -> Result<Vec<(i64, String)>> {
    require_columns(df, &[admin::ADCODE, admin::FULLNAME])?;
    let codes = df.column(admin::ADCODE)?.str()?;
    let names = df.column(admin::FULLNAME)?.str()?;
    Ok(codes
        .into_iter()
        .zip(names.into_iter())
        .filter_map(|(c, n)| Some((parse_code(c?)?, n?.trim().to_string())))
        .collect())
}

pub fn alias_rows(df: &DataFrame) -> Result<Vec<(String, String)>> {
    require_columns(df, &[alias::ALIAS, alias::MAINNAME])?;
    let aliases = df.column(alias::ALIAS)?.str()?;
    let mains = df.column(alias::MAINNAME)?.str()?;
    Ok(aliases
        .into_iter()
        .zip(mains.into_iter())
        .filter_map(|(a, m)| Some((a?.to_string(), m?.to_string())))
        .collect())
}

pub fn short_name_rows(df: &DataFrame) -> Result<Vec<(String, i64)>> {
    require_columns(df, &[shortname::SHORTNAME, shortname::ADCODE])?;
    let names = df.column(shortname::SHORTNAME)?.str()?;
    let codes = df.column(shortname::ADCODE)?.str()?;
    Ok(names
        .into_iter()
        .zip(codes.into_iter())
        .filter_map(|(n, c)| Some((n?.to_string(), parse_code(c?)?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn builder() -> SymbolTableBuilder {
        SymbolTableBuilder::new(["蒙古族".to_string(), "蒙古".to_string(), "藏族".to_string()])
    }

    fn master(rows: &[(i64, &str)]) -> Vec<(i64, String)> {
        rows.iter().map(|(c, n)| (*c, n.to_string())).collect()
    }

    #[test]
    fn test_minimize_drops_unit_suffix() {
        let b = builder();
        assert_eq!(b.minimize("北京市"), "北京");
        assert_eq!(b.minimize("石家庄市"), "石家庄");
        assert_eq!(b.minimize("东城区"), "东城");
    }

    #[test]
    fn test_minimize_keeps_short_names() {
        let b = builder();
        assert_eq!(b.minimize("县"), "县");
        assert_eq!(b.minimize("沙市"), "沙市");
        assert_eq!(b.minimize(&b.minimize("沙市")), "沙市");
    }

    #[test]
    fn test_minimize_strips_minority_and_qualifiers() {
        let b = builder();
        assert_eq!(b.minimize("海西蒙古族藏族自治州"), "海西");
        assert_eq!(b.minimize("香港特别行政区"), "香港");
        assert_eq!(b.minimize("科尔沁左翼中旗"), "科尔沁");
        assert_eq!(b.minimize("察哈尔右翼前旗"), "察哈尔");
    }

    #[test]
    fn test_subdistrict_rows_excluded() {
        let b = builder();
        let mains = b.main_names(&master(&[(110100, "市辖区"), (110101, "东城区")]));
        assert_eq!(mains.len(), 1);
        assert_eq!(mains[0].code, 110101);
    }

    #[test]
    fn test_collision_keeps_highest_level_unit() {
        let b = builder();
        let mains = b.main_names(&master(&[
            (220000, "吉林省"),
            (220200, "吉林市"),
            (130100, "石家庄市"),
        ]));
        let jilin: Vec<_> = mains.iter().filter(|m| m.minimized == "吉林").collect();
        assert_eq!(jilin.len(), 1);
        assert_eq!(jilin[0].code, 220000);
    }

    #[test]
    fn test_collision_tie_prefers_lowest_code() {
        let b = builder();
        let mains = b.main_names(&master(&[(350500, "泉州市"), (330500, "泉州市")]));
        assert_eq!(mains.len(), 1);
        assert_eq!(mains[0].code, 330500);
    }

    #[test]
    fn test_collision_between_counties_still_keeps_one() {
        let b = builder();
        let mains = b.main_names(&master(&[(320115, "江宁区"), (320121, "江宁县")]));
        assert_eq!(mains.len(), 1);
        assert_eq!(mains[0].code, 320115);
    }

    #[test]
    fn test_build_unions_aliases_and_short_names() {
        let b = builder();
        let table = b.build(
            &master(&[(440100, "广州市"), (440300, "深圳市"), (440000, "广东省")]),
            &[
                ("羊城".to_string(), "广州市".to_string()),
                ("鹏城".to_string(), "深圳".to_string()),
                ("无名".to_string(), "不存在市".to_string()),
            ],
            &[("粤".to_string(), 440000)],
        );
        assert_eq!(table.get("广州"), Some(440100));
        assert_eq!(table.get("羊城"), Some(440100));
        assert_eq!(table.get("鹏城"), Some(440300));
        assert_eq!(table.get("粤"), Some(440000));
        assert_eq!(table.get("无名"), None);

        let codes: Vec<i64> = table.entries().iter().map(|(_, c)| *c).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn test_main_name_shadows_conflicting_short_name() {
        let b = builder();
        let table = b.build(
            &master(&[(110000, "北京市")]),
            &[],
            &[("北京".to_string(), 999999)],
        );
        assert_eq!(table.get("北京"), Some(110000));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_frame_round_trip() {
        let table = SymbolTable::from_entries(vec![
            ("上海".to_string(), 310000),
            ("北京".to_string(), 110000),
        ]);
        let df = table.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        let first = df.column(symbol::PLACESYMBOL).unwrap().str().unwrap().get(0);
        assert_eq!(first, Some("北京"));
    }
}
