//! Hook → value → ask prompts for notes, DMs and revisions.

use super::{ConnectionNoteContext, DraftContext, GenerationRequest, RevisionContext, WarmDmContext};
use crate::model::CertificationSignal;

/// Characters of headroom asked for below a hard limit.
const SAFETY_MARGIN: usize = 5;
const VALUE_SNIPPET_CHARS: usize = 500;

pub(super) struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub(super) fn build(request: &GenerationRequest) -> Prompt {
    let mut prompt = match &request.context {
        DraftContext::ConnectionNote(ctx) => connection_note(ctx, request.max_chars),
        DraftContext::WarmDm(ctx) => warm_dm(ctx),
        DraftContext::Revision(ctx) => revision(ctx, request.max_chars),
    };

    if let (Some(previous), Some(limit)) = (request.shorten_from, request.max_chars) {
        prompt.system.push_str(&format!(
            "\n\nSHORTEN: Your previous attempt was {previous} characters, over the {limit} \
             character limit. Rewrite it to at most {} characters. Cut words, not meaning; \
             never end mid-sentence.",
            target(limit)
        ));
    }
    prompt
}

fn target(limit: usize) -> usize {
    limit.saturating_sub(SAFETY_MARGIN)
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or("there")
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resume summary if present, otherwise a plain-interest fallback.
fn value_section(resume_summary: &str) -> String {
    if resume_summary.trim().is_empty() {
        "No specific background provided. Focus on genuine interest in the role.".to_string()
    } else {
        format!(
            "Resume context to draw from:\n{}",
            snippet(resume_summary.trim(), VALUE_SNIPPET_CHARS)
        )
    }
}

fn certification_directive(signal: CertificationSignal, keyword: &str) -> Option<String> {
    let name = capitalize(keyword.trim());
    match signal {
        CertificationSignal::NoSignal => None,
        CertificationSignal::RequirementWithoutSkill => Some(format!(
            "\n\n{upper} CERTIFICATION GAP:\n\
             The job requires {name} but the user does NOT have it yet.\n\
             Weave \"working towards {name} certification\" naturally into Phase 2.\n\
             Brief acknowledgment only; do NOT make it the entire focus.",
            upper = name.to_uppercase()
        )),
        CertificationSignal::RequirementWithSkill => Some(format!(
            "\n\n{upper} MATCH:\n\
             The job requires {name} AND the user has {name} experience.\n\
             Mention \"{name}\" naturally in Phase 2 as a strength.",
            upper = name.to_uppercase()
        )),
    }
}

fn connection_note(ctx: &ConnectionNoteContext, max_chars: Option<usize>) -> Prompt {
    let limit = target(max_chars.unwrap_or(crate::pipeline::rules::CONNECTION_NOTE_LIMIT));
    let title = ctx.contact_title.as_deref().unwrap_or("their role");

    let mut system = format!(
        "You write LinkedIn Connection Request Notes using a 3-Phase structure.\n\
All 3 phases must flow as ONE natural message: no labels, no sections.\n\
\n\
HARD LIMIT: {limit} CHARACTERS. Count every character including spaces and punctuation.\n\
\n\
VISIBILITY RULES:\n\
1. The FIRST 40 characters MUST contain the specific hook. Do not spend them on a greeting.\n\
2. No line break after the salutation.\n\
\n\
PHASE 1 - HOOK (~60 chars):\n\
Reference the contact's specific role ({title}) to show you know who they are.\n\
- Hiring Managers: acknowledge they lead the team for the open role.\n\
- Recruiters: acknowledge their role in hiring for the department.\n\
- Team Members: acknowledge their expertise in the relevant area.\n\
\n\
PHASE 2 - VALUE (~150 chars):\n\
The single most compelling point of fit, distilled from the context below into one sentence.\n\
\n\
PHASE 3 - ASK (~80 chars):\n\
A soft, curious question about the team, culture, or their experience. Not a referral ask.\n\
\n\
RULES:\n\
- NO pleasantries (\"Hope you are well\")\n\
- NO referral requests (\"Can you refer me?\")\n\
- NO formal closings (\"Best regards\")\n\
- Must read as natural conversation, not a template"
    );
    if let Some(directive) = certification_directive(ctx.certification, &ctx.certification_keyword)
    {
        system.push_str(&directive);
    }

    let user = format!(
        "Write a connection request note to:\n\
Contact: {} - {title} ({}) at {}\n\
Role I applied for: {}\n\
\n\
{}\n\
\n\
Generate ONLY the message text. No quotes, no labels, no explanation.\n\
Max {limit} characters. All 3 phases in one flowing message.",
        first_name(&ctx.contact_name),
        ctx.contact_role.display_name(),
        ctx.company,
        ctx.role_title,
        value_section(&ctx.resume_summary),
    );

    Prompt {
        system,
        user,
        temperature: 0.6,
        max_tokens: 150,
    }
}

fn warm_dm(ctx: &WarmDmContext) -> Prompt {
    let first = first_name(&ctx.contact_name);
    let title = ctx
        .contact_title
        .as_deref()
        .map(|t| format!(" ({t})"))
        .unwrap_or_default();
    let connected = ctx
        .connected_on
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let system = format!(
        "You write LinkedIn DMs to existing connections using a 3-Phase structure.\n\
No character limit. Keep it 3-5 sentences total, casual and warm.\n\
All 3 phases flow as ONE natural message: no labels, no sections.\n\
\n\
VISIBILITY RULE:\n\
The FIRST 40 characters must explain WHY you are messaging. \
Do NOT open with \"Hi {first}, how are you?\".\n\
\n\
PHASE 1 - HOOK (1 sentence):\n\
Casual opener. Reference that they're at {company}{title}. \
If the connection date ({connected}) is recent, reference it naturally.\n\
\n\
PHASE 2 - VALUE (1-2 sentences):\n\
Share that you applied to {role} at their company and your most relevant qualification.\n\
\n\
PHASE 3 - ASK (1 sentence):\n\
A genuine question about their experience, the team, or the culture. Not a referral ask.\n\
\n\
RULES:\n\
- Casual tone, like texting a professional acquaintance\n\
- NO formal closings (\"Best regards\")\n\
- NO referral requests (\"Can you put in a word?\")\n\
- NO pleasantries (\"Hope you are well\")",
        company = ctx.company,
        role = ctx.target_role,
    );

    let user = format!(
        "Write a DM to:\n\
Contact: {first} - {} ({}) at {}\n\
Role I applied for: {}\n\
We connected: {connected}\n\
\n\
{}\n\
\n\
Generate ONLY the message. No quotes, no labels.",
        ctx.contact_title.as_deref().unwrap_or("Unknown role"),
        ctx.contact_role.display_name(),
        ctx.company,
        ctx.target_role,
        value_section(&ctx.resume_summary),
    );

    Prompt {
        system,
        user,
        temperature: 0.7,
        max_tokens: 400,
    }
}

fn revision(ctx: &RevisionContext, max_chars: Option<usize>) -> Prompt {
    let constraint = match max_chars {
        Some(limit) => format!("MAXIMUM {} characters.", target(limit)),
        None => "No character limit.".to_string(),
    };

    let system = format!(
        "You edit LinkedIn messages based on user feedback.\n\
\n\
{constraint}\n\
\n\
Rules:\n\
- Apply the edit instruction precisely\n\
- Keep the 3-phase structure (Hook, Value, Ask)\n\
- Keep the hook inside the first 40 characters\n\
- Keep the original intent and tone\n\
- Return ONLY the edited message, without quotes"
    );
    let user = format!(
        "Current message:\n{}\n\nEdit instruction: {}\n\nProvide the revised message:",
        ctx.current_draft, ctx.instruction
    );

    Prompt {
        system,
        user,
        temperature: 0.7,
        max_tokens: if max_chars.is_some() { 200 } else { 400 },
    }
}
