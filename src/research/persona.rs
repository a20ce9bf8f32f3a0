//! 角色档案：规划时的角色描述与偏好来源、综合时的语气要求

use crate::core::state::{Persona, SourceId};

/// 单个角色的提示词素材
#[derive(Debug, Clone, Copy)]
pub struct PersonaProfile {
    pub persona: Persona,
    /// 规划提示中的角色描述
    pub role: &'static str,
    /// 规划时优先考虑的来源
    pub preferred_sources: &'static [&'static str],
    /// 综合报告的语气与侧重
    pub tone: &'static str,
}

const GENERAL: PersonaProfile = PersonaProfile {
    persona: Persona::General,
    role: "a generalist research coordinator, balanced and objective.",
    preferred_sources: &[SourceId::WIKI, SourceId::WEB, SourceId::SCHOLAR],
    tone: "Write for an informed general audience. Be balanced, neutral and clear; define jargon on first use.",
};

const BUSINESS: PersonaProfile = PersonaProfile {
    persona: Persona::Business,
    role: "a market analyst focused on ROI, commercial trends and competition.",
    preferred_sources: &[SourceId::WEB, SourceId::HN, SourceId::REDDIT],
    tone: "Write as a market analyst. Emphasize market size, competitors, business models, risks and ROI. Keep it executive-friendly.",
};

const TECH: PersonaProfile = PersonaProfile {
    persona: Persona::Tech,
    role: "a software architect interested in technical specifications, scalability and architecture.",
    preferred_sources: &[SourceId::GITHUB, SourceId::SO, SourceId::ARXIV],
    tone: "Write as a software architect. Emphasize architecture, implementation details, trade-offs, performance and notable repositories.",
};

const ACADEMIC: PersonaProfile = PersonaProfile {
    persona: Persona::Academic,
    role: "a scientific reviewer looking for rigor, peer-reviewed papers and methodology.",
    preferred_sources: &[SourceId::SCHOLAR, SourceId::ARXIV, SourceId::WIKI],
    tone: "Write as a scientific reviewer. Emphasize methodology, evidence quality, open problems and cite papers precisely.",
};

const PRODUCT_MANAGER: PersonaProfile = PersonaProfile {
    persona: Persona::ProductManager,
    role: "a product manager focused on user needs, product viability and feature prioritization.",
    preferred_sources: &[SourceId::WEB, SourceId::REDDIT, SourceId::HN],
    tone: "Write as a product manager. Emphasize user pain points, competing products, feature opportunities and prioritization.",
};

const NEWS_EDITOR: PersonaProfile = PersonaProfile {
    persona: Persona::NewsEditor,
    role: "a news editor producing a fast digest of what happened recently.",
    preferred_sources: &[SourceId::WEB, SourceId::HN, SourceId::REDDIT],
    tone: "Write as a news editor. Lead with the most recent developments, keep sections short and factual, avoid speculation.",
};

/// 取角色档案
pub fn profile(persona: Persona) -> &'static PersonaProfile {
    match persona {
        Persona::General => &GENERAL,
        Persona::Business => &BUSINESS,
        Persona::Tech => &TECH,
        Persona::Academic => &ACADEMIC,
        Persona::ProductManager => &PRODUCT_MANAGER,
        Persona::NewsEditor => &NEWS_EDITOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_persona_has_profile() {
        for p in Persona::ALL {
            let prof = profile(p);
            assert_eq!(prof.persona, p);
            assert!(!prof.role.is_empty());
            assert!(!prof.tone.is_empty());
            assert!(!prof.preferred_sources.is_empty());
        }
    }

    #[test]
    fn test_tech_prefers_code_sources() {
        assert!(profile(Persona::Tech).preferred_sources.contains(&"github"));
        assert!(profile(Persona::NewsEditor).preferred_sources.contains(&"web"));
    }
}
