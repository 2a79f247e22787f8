/// Column-name constants for every table the pipeline reads or writes.
/// Single source of truth - exported to Python via PyO3.

// ── Administrative master table ─────────────────────────────────────────────
pub mod admin {
    pub const ADCODE: &str = "adcode";
    pub const FULLNAME: &str = "fullname";
}

// ── Alias table ─────────────────────────────────────────────────────────────
pub mod alias {
    pub const ALIAS: &str = "alias";
    pub const MAINNAME: &str = "mainname";
}

// ── Short-name table ────────────────────────────────────────────────────────
pub mod shortname {
    pub const SHORTNAME: &str = "shortname";
    pub const ADCODE: &str = "adcode";
}

// ── Symbol table ────────────────────────────────────────────────────────────
pub mod symbol {
    pub const PLACESYMBOL: &str = "placesymbol";
    pub const PLACECODE: &str = "placecode";
}

// ── POI source and tagged POI columns ───────────────────────────────────────
pub mod poi {
    pub const NAME: &str = "name";
    pub const ID: &str = "_id";
    pub const ADCODE: &str = "adcode";

    pub const TAGGED: [&str; 5] = [
        NAME,
        ID,
        ADCODE,
        super::symbol::PLACESYMBOL,
        super::symbol::PLACECODE,
    ];
}

// ── Excluded units ──────────────────────────────────────────────────────────
pub mod excluded {
    pub const ADCODE: &str = "adcode";
}

// ── OD counts ───────────────────────────────────────────────────────────────
pub mod od {
    pub const OD_CODE: &str = "OD_code";
    pub const COUNT: &str = "count";
}

// ── City geocode table ──────────────────────────────────────────────────────
pub mod geocode {
    pub const ADCODE: &str = "adcode";
    pub const FULLNAME: &str = "fullname";
    pub const GCJ_X: &str = "gcj_x";
    pub const GCJ_Y: &str = "gcj_y";
    pub const WGS_X: &str = "wgs_x";
    pub const WGS_Y: &str = "wgs_y";
}

// ── Symbolic flow table ─────────────────────────────────────────────────────
pub mod flow {
    pub const OD_CODE: &str = super::od::OD_CODE;
    pub const COUNT: &str = super::od::COUNT;
    pub const OCITY: &str = "Ocity";
    pub const DCITY: &str = "Dcity";
    pub const OCITY_NAME: &str = "Ocity_name";
    pub const O_X: &str = "O_X";
    pub const O_Y: &str = "O_Y";
    pub const DCITY_NAME: &str = "Dcity_name";
    pub const D_X: &str = "D_X";
    pub const D_Y: &str = "D_Y";

    pub const ALL: [&str; 10] = [
        OD_CODE, COUNT, OCITY, DCITY, OCITY_NAME, O_X, O_Y, DCITY_NAME, D_X, D_Y,
    ];
}

// ── Per-city metrics ────────────────────────────────────────────────────────
pub mod metrics {
    pub const CITYNAME: &str = "cityname";
    pub const ENTROPY_OUT: &str = "entropy_out";
    pub const ENTROPY_IN: &str = "entropy_in";
    pub const GRAVITY_OUT: &str = "gravity_out";
    pub const GRAVITY_IN: &str = "gravity_in";
}
