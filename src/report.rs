/// Dashboard view of an analysis report.
///
/// Splits the two report blobs back into the sections the dashboard shows,
/// keyed on the same `"<Label>:"` header lines the task templates require,
/// and renders them as markdown with three tabs.
use serde::Serialize;

use crate::normalizer::AnalysisReport;

const MARKET_HEADERS: [&str; 4] = ["Competitors:", "Market Share:", "Industry Trends:", "Challenges:"];
const COMPANY_HEADERS: [&str; 3] = ["Financial Metrics:", "Growth Indicators:", "Hiring Metrics:"];
const HIRING_STATUS_MARKERS: [&str; 3] = ["Active Openings:", "Key Departments:", "Growth Areas:"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketSections {
    pub competitors: Vec<String>,
    pub share: Vec<String>,
    pub trends: Vec<String>,
    pub challenges: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompanySections {
    pub financial: Vec<String>,
    pub growth: Vec<String>,
    pub hiring: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HiringPotential {
    High,
    Moderate,
    Low,
}

impl HiringPotential {
    /// Keyword rating over the research text. Freeze and layoff signals win.
    pub fn assess(research_text: &str) -> Self {
        let content = research_text.to_lowercase();
        if content.contains("hiring freeze") || content.contains("layoff") {
            HiringPotential::Low
        } else if content.contains("moderate") || content.contains("stable") {
            HiringPotential::Moderate
        } else {
            HiringPotential::High
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HiringPotential::High => "High",
            HiringPotential::Moderate => "Moderate",
            HiringPotential::Low => "Low",
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            HiringPotential::High => "🟢",
            HiringPotential::Moderate => "🟡",
            HiringPotential::Low => "🔴",
        }
    }

    pub fn key_factor(self) -> &'static str {
        match self {
            HiringPotential::High => {
                "Active hiring across departments with strong growth indicators"
            }
            HiringPotential::Moderate => "Stable hiring with selective growth",
            HiringPotential::Low => "Limited hiring with potential challenges",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub market: MarketSections,
    pub company: CompanySections,
    pub hiring_status: Vec<String>,
    pub hiring_potential: HiringPotential,
    pub key_factor: String,
}

impl Dashboard {
    pub fn from_report(report: &AnalysisReport) -> Self {
        let [competitors, share, trends, challenges] =
            split_sections(&report.market_text, MARKET_HEADERS);
        let [financial, growth, hiring] = split_sections(&report.research_text, COMPANY_HEADERS);

        let hiring_status = report
            .research_text
            .lines()
            .map(str::trim)
            .filter(|line| HIRING_STATUS_MARKERS.iter().any(|marker| line.contains(marker)))
            .map(format_section)
            .collect();

        let hiring_potential = HiringPotential::assess(&report.research_text);
        Self {
            market: MarketSections {
                competitors,
                share,
                trends,
                challenges,
            },
            company: CompanySections {
                financial,
                growth,
                hiring,
            },
            hiring_status,
            hiring_potential,
            key_factor: hiring_potential.key_factor().to_string(),
        }
    }

    pub fn render_markdown(&self, company: &str) -> String {
        let mut out = format!("# Company Hiring Analytics: {company}\n");

        out.push_str("\n## Market Overview\n");
        out.push_str("\n### 🎯 Market Position\n");
        push_list(&mut out, "Key Competitors", &self.market.competitors);
        push_list(&mut out, "📊 Market Share", &self.market.share);
        out.push_str("\n### 📈 Industry Insights\n");
        push_list(&mut out, "Key Trends", &self.market.trends);
        push_list(&mut out, "🚧 Challenges", &self.market.challenges);

        out.push_str("\n## Company Analysis\n");
        out.push_str("\n### 📊 Company Performance\n");
        push_list(&mut out, "💰 Financial Overview", &self.company.financial);
        push_list(&mut out, "📈 Growth Metrics", &self.company.growth);

        out.push_str("\n## Hiring Analysis\n");
        push_list(&mut out, "Current Hiring Status", &self.hiring_status);
        out.push_str(&format!(
            "\n#### Hiring Potential\n\n{} {}\n\n#### Key Factors\n\n• {}\n",
            self.hiring_potential.indicator(),
            self.hiring_potential.label(),
            self.key_factor
        ));
        out
    }
}

/// Leading `-` bullets become `• item`; everything else is just trimmed.
pub fn format_section(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.strip_prefix('-') {
        Some(rest) => format!("• {}", rest.trim()),
        None => trimmed.to_string(),
    }
}

/// Walk `text` line by line, switching section whenever a line contains one
/// of `headers`. Lines before the first header are dropped.
///
/// Header lines do more than switch sections: agents often answer inline
/// (`- Competitors: Globex, Initech`), so any text after the header is kept
/// as the section's first item rather than thrown away with the header.
fn split_sections<const N: usize>(text: &str, headers: [&str; N]) -> [Vec<String>; N] {
    let mut sections: [Vec<String>; N] = std::array::from_fn(|_| Vec::new());
    let mut current: Option<usize> = None;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some((idx, inline)) = headers
            .iter()
            .enumerate()
            .find_map(|(idx, header)| line.split_once(header).map(|(_, rest)| (idx, rest)))
        {
            current = Some(idx);
            let inline = inline.trim();
            if !inline.is_empty() {
                sections[idx].push(inline.to_string());
            }
            continue;
        }
        if let Some(idx) = current {
            sections[idx].push(format_section(line));
        }
    }

    sections
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n#### {title}\n\n"));
    for item in items {
        out.push_str(item);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AnalysisReport {
        AnalysisReport {
            research_text: "Financial Metrics:\n- Revenue: $2B\nHiring Metrics:\n- Active Openings: 120\n- Key Departments: Engineering\nGrowth Indicators:\n- Employee Growth: 5%".to_string(),
            market_text: "Market Position:\nCompetitors:\n- Globex\n- Initech\nMarket Share: 12%\nIndustry Trends:\n- Consolidation\nChallenges:\n- Pricing".to_string(),
        }
    }

    #[test]
    fn format_section_turns_dashes_into_bullets() {
        assert_eq!(format_section("- Revenue: $1B"), "• Revenue: $1B");
        assert_eq!(format_section("  -Revenue  "), "• Revenue");
        assert_eq!(format_section("Plain text "), "Plain text");
    }

    #[test]
    fn market_lines_fall_into_their_sections() {
        let dashboard = Dashboard::from_report(&report());
        assert_eq!(dashboard.market.competitors, vec!["• Globex", "• Initech"]);
        assert_eq!(dashboard.market.share, vec!["12%"]);
        assert_eq!(dashboard.market.trends, vec!["• Consolidation"]);
        assert_eq!(dashboard.market.challenges, vec!["• Pricing"]);
    }

    #[test]
    fn inline_header_values_become_the_first_item() {
        let report = AnalysisReport {
            research_text: String::new(),
            market_text: "Market Position:\n- Competitors: Globex, Initech\n- Umbrella\n- Market Share: 9%"
                .to_string(),
        };
        let dashboard = Dashboard::from_report(&report);
        assert_eq!(
            dashboard.market.competitors,
            vec!["Globex, Initech", "• Umbrella"]
        );
        assert_eq!(dashboard.market.share, vec!["9%"]);
    }

    #[test]
    fn company_sections_and_hiring_status_are_extracted() {
        let dashboard = Dashboard::from_report(&report());
        assert_eq!(dashboard.company.financial, vec!["• Revenue: $2B"]);
        assert_eq!(dashboard.company.growth, vec!["• Employee Growth: 5%"]);
        assert_eq!(dashboard.company.hiring.len(), 2);
        assert_eq!(
            dashboard.hiring_status,
            vec!["• Active Openings: 120", "• Key Departments: Engineering"]
        );
    }

    #[test]
    fn hiring_potential_prefers_freeze_signals() {
        assert_eq!(
            HiringPotential::assess("Stable growth but a Hiring Freeze in sales"),
            HiringPotential::Low
        );
        assert_eq!(HiringPotential::assess("Layoffs announced"), HiringPotential::Low);
        assert_eq!(
            HiringPotential::assess("Moderate expansion"),
            HiringPotential::Moderate
        );
        assert_eq!(HiringPotential::assess("Hiring 400 engineers"), HiringPotential::High);
        assert_eq!(
            HiringPotential::Moderate.key_factor(),
            "Stable hiring with selective growth"
        );
    }

    #[test]
    fn markdown_has_three_tabs_and_skips_empty_sections() {
        let rendered = Dashboard::from_report(&report()).render_markdown("Acme");
        assert!(rendered.starts_with("# Company Hiring Analytics: Acme"));
        assert!(rendered.contains("## Market Overview"));
        assert!(rendered.contains("## Company Analysis"));
        assert!(rendered.contains("## Hiring Analysis"));
        assert!(rendered.contains("• Globex\n"));
        assert!(rendered.contains("🟢 High"));

        let empty = Dashboard::from_report(&AnalysisReport::default()).render_markdown("Acme");
        assert!(!empty.contains("Key Competitors"));
    }
}
