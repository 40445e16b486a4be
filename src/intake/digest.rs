//! Marketplace digest email parser.
//!
//! Digest mails list several project leads, each with a listing link, an
//! optional budget line, and an optional skills line. The parser is
//! deliberately tolerant: a block without a link is skipped, a budget that
//! does not parse leaves the bounds unset.

use regex::Regex;

use crate::{AppError, Result};

/// One project lead extracted from a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestLead {
    /// Lead title.
    pub title: String,
    /// Listing URL.
    pub url: String,
    /// Description text from the digest block.
    pub description: String,
    /// Lower budget bound.
    pub budget_min: Option<f64>,
    /// Upper budget bound.
    pub budget_max: Option<f64>,
    /// Skill tags from the digest block.
    pub skills: Vec<String>,
}

/// Compiled digest patterns.
pub struct DigestParser {
    link: Regex,
    budget: Regex,
    skills: Regex,
}

impl DigestParser {
    /// Compile the digest patterns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a pattern fails to compile, which
    /// indicates a programming error rather than bad input.
    pub fn new() -> Result<Self> {
        let link = Regex::new(r#"https?://www\.freelancer\.com/projects/[^\s<>")]+"#)
            .map_err(|e| AppError::Config(format!("digest link pattern: {e}")))?;
        let budget = Regex::new(
            r"(?i)budget:?\s*[$€£]?\s*([\d,]+(?:\.\d+)?)(?:\s*[-–]\s*[$€£]?\s*([\d,]+(?:\.\d+)?))?",
        )
        .map_err(|e| AppError::Config(format!("digest budget pattern: {e}")))?;
        let skills = Regex::new(r"(?i)skills:?\s*(.+)")
            .map_err(|e| AppError::Config(format!("digest skills pattern: {e}")))?;
        Ok(Self {
            link,
            budget,
            skills,
        })
    }

    /// Whether a mail body looks like a digest at all. A single listing
    /// link is more likely a client reply quoting the listing; digests
    /// carry several.
    #[must_use]
    pub fn looks_like_digest(&self, body: &str) -> bool {
        self.link.find_iter(body).take(2).count() >= 2
    }

    /// First listing URL in a text, if any.
    #[must_use]
    pub fn first_link(&self, text: &str) -> Option<String> {
        self.link.find(text).map(|m| m.as_str().to_string())
    }

    /// Extract all leads from a digest body.
    #[must_use]
    pub fn parse(&self, body: &str) -> Vec<DigestLead> {
        let mut leads = Vec::new();
        for block in body.split("\n\n") {
            if let Some(lead) = self.parse_block(block) {
                leads.push(lead);
            }
        }
        leads
    }

    fn parse_block(&self, block: &str) -> Option<DigestLead> {
        let url = self.link.find(block)?.as_str().to_string();

        let mut title = String::new();
        let mut description_lines = Vec::new();
        let mut budget_min = None;
        let mut budget_max = None;
        let mut skills = Vec::new();

        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() || line.contains(url.as_str()) {
                continue;
            }
            if let Some(caps) = self.budget.captures(line) {
                budget_min = caps.get(1).and_then(|m| parse_amount(m.as_str()));
                budget_max = caps.get(2).and_then(|m| parse_amount(m.as_str()));
                continue;
            }
            if let Some(caps) = self.skills.captures(line) {
                if let Some(list) = caps.get(1) {
                    skills = list
                        .as_str()
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                continue;
            }
            if title.is_empty() {
                title = line.to_string();
            } else {
                description_lines.push(line);
            }
        }

        if title.is_empty() {
            return None;
        }
        Some(DigestLead {
            title,
            url,
            description: description_lines.join("\n"),
            budget_min,
            budget_max,
            skills,
        })
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}
