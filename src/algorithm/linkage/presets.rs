//! Standard person-linkage strategy
//!
//! Five blocking passes over standardized person fields:
//!
//! | pass | blocking                                   |
//! |------|--------------------------------------------|
//! | 0    | common id, names and full date of birth    |
//! | 1    | common id                                  |
//! | 2    | first and last name soundex                |
//! | 3    | soundex, first and last name swapped       |
//! | 4    | date of birth                              |
//!
//! Each looser tier of a pass also accepts everything its stricter tier
//! accepts, through the `p<pass>_<tier>` masks.

use std::collections::BTreeMap;

use crate::algorithm::linkage::rules::{Bound, Rule};
use crate::config::{ComparisonConfig, LinkageConfig, PassRules};
use crate::models::Tier;
use crate::similarity::MeasureParams;

/// Standardized field names read by [`standard_config`]
pub const STANDARD_FIELDS: &[&str] = &[
    "common_id",
    "fname",
    "mname",
    "lname",
    "altlname",
    "minitial",
    "xf",
    "xl",
    "byear",
    "bmonth",
    "bday",
    "zipcode",
    "county",
];

const NAME_HIGH: &str = "name_high_score";
const NAME_REVIEW: &str = "name_review_score";

/// The standard five-pass configuration
#[must_use]
pub fn standard_config() -> LinkageConfig {
    let mut masks = standard_masks();
    let acceptance_by_pass = vec![
        PassRules::uniform(&Rule::Always),
        tiered(&mut masks, 1, pass1_rules()),
        tiered(&mut masks, 2, pass2_rules()),
        tiered(&mut masks, 3, pass3_rules()),
        tiered(&mut masks, 4, pass4_rules()),
    ];

    LinkageConfig {
        blocks_by_pass: vec![
            names(&["common_id", "fname", "lname", "byear", "bmonth", "bday"]),
            names(&["common_id"]),
            names(&["xf", "xl"]),
            names(&["xf_inv", "xl_inv"]),
            names(&["byear", "bmonth", "bday"]),
        ],
        comp_names_by_pass: vec![
            Vec::new(),
            names(&[
                "fname", "mname", "lname", "altlname", "bmonthbday", "byear", "fnamelname",
                "lnamefname",
            ]),
            names(&[
                "fname", "mname", "lname", "altlname", "bmonthbday", "byear", "common_id",
                "minitial", "zipcode", "county",
            ]),
            names(&[
                "fnamelname", "mname", "lnamefname", "altlname", "bmonthbday", "byear",
                "common_id", "minitial", "zipcode", "county",
            ]),
            names(&[
                "fname", "mname", "lname", "altlname", "common_id", "minitial", "zipcode",
                "county",
            ]),
        ],
        comparisons: standard_comparisons(),
        acceptance_by_pass,
        thresholds: standard_thresholds(),
        masks,
        ..LinkageConfig::default()
    }
}

/// Comparison definitions of the standard strategy
#[must_use]
pub fn standard_comparisons() -> BTreeMap<String, ComparisonConfig> {
    let jaro = |missing| ComparisonConfig::new("jarowinkler").with_missing_value(missing);

    let comparisons = [
        ("fname", jaro(0.5)),
        ("lname", jaro(0.5)),
        ("mname", jaro(-1.0)),
        ("altlname", jaro(0.5)),
        ("fnamelname", jaro(0.5).with_side_fields(&["fname"], &["lname"])),
        ("lnamefname", jaro(0.5).with_side_fields(&["lname"], &["fname"])),
        (
            "bmonthbday",
            ComparisonConfig::new("bmonthbday")
                .with_fields(&["bmonth", "bday"])
                .with_params(MeasureParams {
                    swap_month_day: Some(0.8),
                    either_month_day: Some(0.6),
                    ..MeasureParams::missing(0.5)
                }),
        ),
        (
            "byear",
            ComparisonConfig::new("byear").with_params(MeasureParams {
                within_1y: Some(0.7),
                ..MeasureParams::missing(0.5)
            }),
        ),
        ("common_id", ComparisonConfig::new("levenshtein").with_missing_value(-1.0)),
        ("zipcode", ComparisonConfig::new("exact").with_missing_value(0.5)),
        ("county", ComparisonConfig::new("exact").with_missing_value(0.5)),
        (
            "minitial",
            ComparisonConfig::new("minitial")
                .with_fields(&["minitial", "mname"])
                .with_params(MeasureParams {
                    minit_match_mname_unclear: Some(0.7),
                    ..MeasureParams::missing(0.5)
                }),
        ),
    ];

    comparisons
        .into_iter()
        .map(|(name, comparison)| (name.to_string(), comparison))
        .collect()
}

/// Cutoff scores of the standard strategy
///
/// The birth date and middle initial cutoffs equal the partial-agreement
/// scores of their comparisons.
#[must_use]
pub fn standard_thresholds() -> BTreeMap<String, f64> {
    [
        (NAME_HIGH, 0.88),
        ("name_very_high_score", 0.90),
        ("id_high_score", 0.75),
        (NAME_REVIEW, 0.8),
        ("id_review_score", 0.65),
        ("byear_within1_score", 0.7),
        ("bmonthbday_either_score", 0.6),
        ("bmonthbday_inv_score", 0.8),
        ("minit_match_mname_unclear", 0.7),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

/// Shared masks of the standard strategy
#[must_use]
pub fn standard_masks() -> BTreeMap<String, Rule> {
    let masks = [
        ("common_id_null", Rule::equals("common_id", -1.0)),
        ("id_high", Rule::at_least("common_id", "id_high_score")),
        ("id_review", Rule::at_least("common_id", "id_review_score")),
        (
            "minit_match_mname_veryhighsim",
            Rule::any(vec![
                exact("minitial"),
                Rule::all(vec![
                    Rule::equals("minitial", "minit_match_mname_unclear"),
                    Rule::at_least("mname", "name_very_high_score"),
                ]),
            ]),
        ),
        ("dob_exact", Rule::all(vec![exact("bmonthbday"), exact("byear")])),
        (
            "dob_partial",
            Rule::any(vec![
                Rule::all(vec![exact("bmonthbday"), Rule::at_least("byear", "byear_within1_score")]),
                Rule::all(vec![
                    Rule::between("bmonthbday", "bmonthbday_either_score", "bmonthbday_inv_score"),
                    exact("byear"),
                ]),
            ]),
        ),
        ("loc_exact", Rule::any(vec![exact("zipcode"), exact("county")])),
    ];

    masks
        .into_iter()
        .map(|(name, rule)| (name.to_string(), rule))
        .collect()
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn exact(score: &str) -> Rule {
    Rule::equals(score, 1.0)
}

fn high(score: &str) -> Rule {
    Rule::at_least(score, NAME_HIGH)
}

fn review_close(score: &str, offset: f64) -> Rule {
    Rule::at_least(score, Bound::offset(NAME_REVIEW, offset))
}

/// Register each tier as a mask and OR it into the next looser tier
fn tiered(masks: &mut BTreeMap<String, Rule>, pass: usize, rules: [Rule; 4]) -> PassRules {
    let mut previous: Option<String> = None;
    let mut chain = |tier: Tier, rule: Rule| {
        let rule = match previous.take() {
            Some(stricter) => Rule::any(vec![Rule::mask(stricter), rule]),
            None => rule,
        };
        let name = format!("p{pass}_{tier}");
        masks.insert(name.clone(), rule);
        previous = Some(name.clone());
        Rule::mask(name)
    };

    let [strict, moderate, relaxed, review] = rules;
    PassRules::new(
        chain(Tier::Strict, strict),
        chain(Tier::Moderate, moderate),
        chain(Tier::Relaxed, relaxed),
        chain(Tier::Review, review),
    )
}

/// Two of first name, last name and birth date exact, the third close
fn two_exact_third_close(first: &str, last: &str) -> Rule {
    Rule::any(vec![
        Rule::all(vec![exact(first), exact(last), Rule::mask("dob_partial")]),
        Rule::all(vec![high(first), exact(last), Rule::mask("dob_exact")]),
        Rule::all(vec![exact(first), high(last), Rule::mask("dob_exact")]),
    ])
}

/// Good middle-name evidence, or a close alternative last name
fn middle_or_alt_close() -> Rule {
    Rule::any(vec![Rule::mask("minit_match_mname_veryhighsim"), high("altlname")])
}

fn middle_or_alt_exact() -> Rule {
    Rule::any(vec![exact("altlname"), Rule::mask("minit_match_mname_veryhighsim")])
}

fn pass1_rules() -> [Rule; 4] {
    let strict = Rule::any(vec![
        Rule::all(vec![high("fname"), high("lname"), Rule::mask("dob_partial")]),
        Rule::all(vec![high("fnamelname"), high("lnamefname"), Rule::mask("dob_partial")]),
    ]);
    let moderate = Rule::any(vec![
        Rule::all(vec![high("fname"), high("lname")]),
        Rule::all(vec![high("fnamelname"), high("lnamefname")]),
        Rule::all(vec![high("fname"), Rule::at_least("byear", "byear_within1_score")]),
        Rule::all(vec![
            Rule::any(vec![high("fname"), high("lname")]),
            Rule::any(vec![Rule::mask("dob_exact"), Rule::mask("dob_partial")]),
        ]),
    ]);
    let relaxed = Rule::any(vec![
        high("fname"),
        Rule::mask("dob_exact"),
        Rule::mask("dob_partial"),
    ]);
    [strict, moderate, relaxed, Rule::Always]
}

fn pass2_rules() -> [Rule; 4] {
    let strict = Rule::any(vec![
        Rule::all(vec![Rule::mask("id_high"), two_exact_third_close("fname", "lname")]),
        Rule::all(vec![
            Rule::mask("common_id_null"),
            Rule::any(vec![
                Rule::all(vec![two_exact_third_close("fname", "lname"), middle_or_alt_close()]),
                Rule::all(vec![
                    exact("fname"),
                    exact("lname"),
                    Rule::mask("dob_exact"),
                    Rule::equals("mname", -1.0),
                    Rule::mask("loc_exact"),
                ]),
            ]),
        ]),
        Rule::all(vec![
            exact("fname"),
            exact("lname"),
            Rule::mask("dob_exact"),
            middle_or_alt_exact(),
        ]),
    ]);
    let moderate = Rule::all(vec![
        high("fname"),
        high("lname"),
        Rule::mask("dob_partial"),
        Rule::any(vec![
            Rule::mask("id_high"),
            high("mname"),
            high("altlname"),
            Rule::mask("loc_exact"),
        ]),
    ]);
    let relaxed = Rule::all(vec![
        high("fname"),
        high("lname"),
        Rule::any(vec![Rule::mask("dob_partial"), Rule::mask("id_high")]),
    ]);
    let review = Rule::all(vec![
        review_close("fname", 0.0),
        review_close("lname", 0.0),
        Rule::any(vec![Rule::mask("dob_partial"), Rule::mask("id_review")]),
    ]);
    [strict, moderate, relaxed, review]
}

fn pass3_rules() -> [Rule; 4] {
    let strict = Rule::any(vec![
        Rule::all(vec![
            Rule::mask("id_high"),
            two_exact_third_close("fnamelname", "lnamefname"),
        ]),
        Rule::all(vec![
            Rule::mask("common_id_null"),
            two_exact_third_close("fnamelname", "lnamefname"),
            middle_or_alt_close(),
        ]),
        Rule::all(vec![
            exact("fnamelname"),
            exact("lnamefname"),
            Rule::mask("dob_exact"),
            middle_or_alt_exact(),
        ]),
    ]);
    let moderate = Rule::any(vec![
        Rule::all(vec![
            high("fnamelname"),
            high("lnamefname"),
            Rule::mask("dob_partial"),
            Rule::any(vec![
                Rule::mask("id_high"),
                high("mname"),
                high("altlname"),
                Rule::mask("loc_exact"),
            ]),
        ]),
        Rule::all(vec![
            Rule::mask("common_id_null"),
            exact("fnamelname"),
            exact("lnamefname"),
            Rule::mask("dob_exact"),
            Rule::equals("mname", -1.0),
            Rule::mask("loc_exact"),
        ]),
    ]);
    let relaxed = Rule::all(vec![
        high("fnamelname"),
        high("lnamefname"),
        Rule::any(vec![Rule::mask("dob_exact"), Rule::mask("id_high")]),
    ]);
    let review = Rule::all(vec![
        review_close("fnamelname", -0.05),
        review_close("lnamefname", -0.05),
        Rule::any(vec![Rule::mask("dob_partial"), Rule::mask("id_review")]),
    ]);
    [strict, moderate, relaxed, review]
}

fn pass4_rules() -> [Rule; 4] {
    let strict = Rule::any(vec![
        Rule::all(vec![Rule::mask("id_high"), high("fname"), high("lname")]),
        Rule::all(vec![
            Rule::mask("common_id_null"),
            exact("fname"),
            high("lname"),
            middle_or_alt_close(),
        ]),
        Rule::all(vec![exact("fname"), high("lname"), middle_or_alt_exact()]),
    ]);
    let moderate = Rule::all(vec![
        high("fname"),
        high("lname"),
        Rule::any(vec![high("mname"), high("altlname"), Rule::mask("loc_exact")]),
    ]);
    let relaxed = Rule::any(vec![
        Rule::all(vec![high("lname"), high("fname")]),
        Rule::all(vec![high("lname"), Rule::mask("id_high")]),
        Rule::all(vec![Rule::mask("id_high"), high("fname")]),
    ]);
    let review = Rule::any(vec![
        Rule::all(vec![review_close("lname", -0.1), Rule::mask("id_review")]),
        Rule::all(vec![review_close("fname", -0.1), review_close("lname", -0.1)]),
    ]);
    [strict, moderate, relaxed, review]
}
