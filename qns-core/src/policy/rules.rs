//! `nom` grammars for the two carrier-config rule strings named in §6:
//! the handover allow/deny rule and the IMS fallback rule. Each has a
//! matching `Display` impl so parse-then-render round-trips (P8).

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::separated_list1,
    sequence::separated_pair,
    IResult,
};
use qns_events::{AccessNetworkKind, Preference};

use crate::error::QnsError;
use crate::policy::carrier_config::preference_from_str;

fn invalid(rule: &str, reason: impl Into<String>) -> QnsError {
    QnsError::ConfigInvalid {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

fn access_network(input: &str) -> IResult<&str, AccessNetworkKind> {
    alt((
        value(AccessNetworkKind::Geran, tag_no_case("geran")),
        value(AccessNetworkKind::Utran, tag_no_case("utran")),
        value(AccessNetworkKind::Eutran, tag_no_case("eutran")),
        value(AccessNetworkKind::Ngran, tag_no_case("ngran")),
        value(AccessNetworkKind::Iwlan, tag_no_case("iwlan")),
    ))(input)
}

fn access_network_list(input: &str) -> IResult<&str, Vec<AccessNetworkKind>> {
    separated_list1(char('|'), access_network)(input)
}

fn bool_value(input: &str) -> IResult<&str, bool> {
    alt((value(true, tag_no_case("true")), value(false, tag_no_case("false"))))(input)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoverRule {
    pub source: Vec<AccessNetworkKind>,
    pub target: Vec<AccessNetworkKind>,
    pub allowed: bool,
    pub capabilities: Vec<String>,
    pub roaming: Option<bool>,
}

impl HandoverRule {
    pub fn matches(&self, src: AccessNetworkKind, dst: AccessNetworkKind) -> bool {
        self.source.contains(&src) && self.target.contains(&dst)
    }

    pub fn parse(raw: &str) -> Result<Self, QnsError> {
        let trimmed = raw.trim();
        let mut source = None;
        let mut target = None;
        let mut allowed = None;
        let mut capabilities = Vec::new();
        let mut roaming = None;

        for field in trimmed.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| invalid(raw, format!("missing `=` in field `{field}`")))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "source" => {
                    let (_, nets) = all_consuming(access_network_list)(value).map_err(|_| invalid(raw, "malformed source list"))?;
                    source = Some(nets);
                }
                "target" => {
                    let (_, nets) = all_consuming(access_network_list)(value).map_err(|_| invalid(raw, "malformed target list"))?;
                    target = Some(nets);
                }
                "type" => {
                    allowed = Some(match value.to_ascii_lowercase().as_str() {
                        "allowed" => true,
                        "disallowed" => false,
                        other => return Err(invalid(raw, format!("unknown type token `{other}`"))),
                    });
                }
                "capabilities" => {
                    capabilities = value.split('|').map(|s| s.trim().to_string()).collect();
                }
                "roaming" => {
                    let (_, b) = all_consuming(bool_value)(value).map_err(|_| invalid(raw, "malformed roaming value"))?;
                    roaming = Some(b);
                }
                other => return Err(invalid(raw, format!("unknown key `{other}`"))),
            }
        }

        let source = source.ok_or_else(|| invalid(raw, "missing required `source` side"))?;
        let target = target.ok_or_else(|| invalid(raw, "missing required `target` side"))?;
        let allowed = allowed.ok_or_else(|| invalid(raw, "missing required `type`"))?;

        if source.is_empty() || target.is_empty() {
            return Err(invalid(raw, "source/target must be non-empty"));
        }
        if !source.contains(&AccessNetworkKind::Iwlan) && !target.contains(&AccessNetworkKind::Iwlan) {
            return Err(invalid(raw, "at least one side must be IWLAN"));
        }

        Ok(HandoverRule {
            source,
            target,
            allowed,
            capabilities,
            roaming,
        })
    }
}

fn net_list_str(nets: &[AccessNetworkKind]) -> String {
    nets.iter()
        .map(|n| format!("{n}").to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("|")
}

impl fmt::Display for HandoverRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source={},target={},type={}",
            net_list_str(&self.source),
            net_list_str(&self.target),
            if self.allowed { "allowed" } else { "disallowed" }
        )?;
        if !self.capabilities.is_empty() {
            write!(f, ",capabilities={}", self.capabilities.join("|"))?;
        }
        if let Some(roaming) = self.roaming {
            write!(f, ",roaming={roaming}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CauseRange {
    pub start: i32,
    pub end: i32,
}

impl CauseRange {
    pub fn contains(self, code: i32) -> bool {
        code >= self.start && code <= self.end
    }
}

fn signed_i32(input: &str) -> IResult<&str, i32> {
    map_res(
        nom::sequence::pair(opt(char('-')), digit1),
        |(sign, digits): (Option<char>, &str)| {
            digits.parse::<i32>().map(|v| if sign.is_some() { -v } else { v })
        },
    )(input)
}

fn cause_range(input: &str) -> IResult<&str, CauseRange> {
    alt((
        map(separated_pair(signed_i32, char('~'), signed_i32), |(start, end)| CauseRange { start, end }),
        map(signed_i32, |code| CauseRange { start: code, end: code }),
    ))(input)
}

fn cause_ranges(input: &str) -> IResult<&str, Vec<CauseRange>> {
    separated_list1(char('|'), cause_range)(input)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRule {
    pub causes: Vec<CauseRange>,
    pub time_ms: u64,
    pub preference: Option<Preference>,
}

impl FallbackRule {
    pub fn matches_cause(&self, cause_code: i32) -> bool {
        self.causes.iter().any(|r| r.contains(cause_code))
    }

    pub fn parse(raw: &str) -> Result<Self, QnsError> {
        let trimmed = raw.trim();
        let mut causes = None;
        let mut time_ms = None;
        let mut preference = None;

        for field in trimmed.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| invalid(raw, format!("missing `=` in field `{field}`")))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "cause" => {
                    let (_, ranges) = all_consuming(cause_ranges)(value).map_err(|_| invalid(raw, "malformed cause list"))?;
                    causes = Some(ranges);
                }
                "time" => {
                    time_ms = Some(value.parse::<u64>().map_err(|_| invalid(raw, "malformed time value"))?);
                }
                "preference" => {
                    preference =
                        Some(preference_from_str(value).ok_or_else(|| invalid(raw, format!("unknown preference token `{value}`")))?);
                }
                other => return Err(invalid(raw, format!("unknown key `{other}`"))),
            }
        }

        let causes = causes.ok_or_else(|| invalid(raw, "missing required `cause`"))?;
        let time_ms = time_ms.ok_or_else(|| invalid(raw, "missing required `time`"))?;

        Ok(FallbackRule { causes, time_ms, preference })
    }
}

impl fmt::Display for FallbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let causes = self
            .causes
            .iter()
            .map(|r| if r.start == r.end { r.start.to_string() } else { format!("{}~{}", r.start, r.end) })
            .collect::<Vec<_>>()
            .join("|");
        write!(f, "cause={causes},time={}", self.time_ms)?;
        if let Some(pref) = self.preference {
            write!(f, ",preference={}", if pref == Preference::CellPref { "cell" } else { "wifi" })?;
        }
        Ok(())
    }
}
