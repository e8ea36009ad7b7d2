use crate::core::{Finding, Severity};

/// Applies severity rules to an aggregated finding, starting from its base severity.
pub struct SeverityCalculator {
    rules: Vec<Box<dyn SeverityRule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeverityContext {
    pub escalation_factors: Vec<String>,
}

impl SeverityCalculator {
    pub fn new(escalation_threshold: Option<usize>) -> Self {
        let mut rules: Vec<Box<dyn SeverityRule>> = Vec::new();
        if let Some(threshold) = escalation_threshold {
            rules.push(Box::new(OccurrenceEscalationRule { threshold }));
        }
        Self { rules }
    }

    pub fn calculate(&self, finding: &Finding) -> (Severity, SeverityContext) {
        let mut severity = finding.base_severity;
        let mut context = SeverityContext::default();

        for rule in &self.rules {
            if let Some(adjustment) = rule.evaluate(finding, &context) {
                severity = adjustment.apply_to(severity);
                let SeverityAdjustment::Escalate(reason) = adjustment;
                context.escalation_factors.push(reason);
            }
        }

        (severity, context)
    }

    pub fn apply(&self, finding: Finding) -> Finding {
        let (severity, context) = self.calculate(&finding);
        let mut finding = finding.adjust_severity(severity);
        finding.escalation_factors = context.escalation_factors;
        finding
    }
}

pub trait SeverityRule: Send + Sync {
    fn evaluate(&self, finding: &Finding, context: &SeverityContext) -> Option<SeverityAdjustment>;
}

pub enum SeverityAdjustment {
    Escalate(String),
}

impl SeverityAdjustment {
    fn apply_to(&self, current: Severity) -> Severity {
        match self {
            Self::Escalate(_) => current.escalate(),
        }
    }
}

impl Severity {
    pub fn escalate(&self) -> Self {
        match self {
            Self::Info => Self::Warning,
            Self::Warning => Self::Critical,
            Self::Critical => Self::Critical,
        }
    }
}

/// Bumps a finding one level when its occurrence count exceeds the threshold.
struct OccurrenceEscalationRule {
    threshold: usize,
}

impl SeverityRule for OccurrenceEscalationRule {
    fn evaluate(
        &self,
        finding: &Finding,
        _context: &SeverityContext,
    ) -> Option<SeverityAdjustment> {
        if finding.occurrences > self.threshold {
            return Some(SeverityAdjustment::Escalate(format!(
                "{} occurrences exceed threshold {}",
                finding.occurrences, self.threshold
            )));
        }
        None
    }
}

impl Default for SeverityCalculator {
    fn default() -> Self {
        Self::new(Some(crate::core::context::DEFAULT_ESCALATION_THRESHOLD))
    }
}
