//! Prompt composition. Pure: the same request and references always yield the
//! same instructions, so everything here is tested without I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::retrieval::ReferenceDocument;

const LINKEDIN_TEMPLATE: &str = "# System Role
You are an expert LinkedIn content creator specializing in transforming incoming articles into highly engaging posts tailored to a specific target audience.

# Task Specification
Using the provided article, craft a LinkedIn post that is:
1. Written in a concise, engaging tone optimized for readability on mobile.
2. Tailored specifically to the target audience's interests, needs, and professional goals.
3. Plain text only, with frequent line breaks for clarity.
4. Incorporates 1-2 emojis to enhance personality and appeal.
5. Provides actionable value and includes a clear call to action.
6. Contains 3-5 relevant hashtags.
7. Outputs only the post text—nothing else.";

const TWITTER_TEMPLATE: &str = "# System Role
You are an expert Twitter content creator specializing in transforming articles into engaging, concise tweets tailored to a specific target audience.

# Task Specification
Using the provided article, craft a tweet that is:
1. Short, concise, and optimized for Twitter's character limit (280 characters).
2. Tailored to resonate with the target audience's interests, needs, and goals.
3. Incorporates 1-2 emojis to enhance personality and appeal.
4. Offers value or insight and includes a clear call to action.
5. Contains 1-3 relevant hashtags.
6. Outputs only the tweet text—nothing else.";

const BLOG_TEMPLATE: &str = "# System Role
You are a skilled and creative blog writer, capable of crafting engaging, concise, and well-structured two-paragraph blog articles based on provided content.

# Task Specification
Write a two-paragraph blog article using the provided content. The blog should be coherent, engaging, and informative, tailored to a general audience. Ensure the tone is professional yet approachable, and the structure flows logically from introduction to conclusion.";

const DEFAULT_TONE: &str = "professional";
const DEFAULT_LENGTH: &str = "medium";
const DEFAULT_AUDIENCE: &str = "unspecified";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Twitter,
    Blog,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Blog => "blog",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            Platform::Linkedin => LINKEDIN_TEMPLATE,
            Platform::Twitter => TWITTER_TEMPLATE,
            Platform::Blog => BLOG_TEMPLATE,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::Linkedin),
            "twitter" => Ok(Platform::Twitter),
            "blog" => Ok(Platform::Blog),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// A single generation ask. Blank optional fields are treated as absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub platform: Platform,
    pub tone: Option<String>,
    pub length: Option<String>,
    pub target_audience: Option<String>,
    pub campaign_name: Option<String>,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, platform: Platform) -> Self {
        Self {
            topic: topic.into(),
            platform,
            tone: None,
            length: None,
            target_audience: None,
            campaign_name: None,
        }
    }

    /// Collapse blank optional strings to `None` and trim the rest.
    pub fn normalized(mut self) -> Self {
        self.topic = self.topic.trim().to_string();
        self.tone = blank_to_none(self.tone);
        self.length = blank_to_none(self.length);
        self.target_audience = blank_to_none(self.target_audience);
        self.campaign_name = blank_to_none(self.campaign_name);
        self
    }
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("topic must not be empty")]
    EmptyTopic,
}

pub fn compose(req: &GenerationRequest, references: &[ReferenceDocument]) -> Result<Prompt, ComposeError> {
    let topic = req.topic.trim();
    if topic.is_empty() {
        return Err(ComposeError::EmptyTopic);
    }
    let platform = req.platform.as_str();

    let reference_text = references
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let system = format!(
        "{template}\n\nCreate a {platform} post about {topic}.\nTone: {tone}\nLength: {length}\nTarget Audience: {audience}\nUse the following reference content: {reference_text}",
        template = req.platform.template(),
        tone = or_default(&req.tone, DEFAULT_TONE),
        length = or_default(&req.length, DEFAULT_LENGTH),
        audience = or_default(&req.target_audience, DEFAULT_AUDIENCE),
    );
    let user = format!("Please write a {platform} post about: {topic}");

    Ok(Prompt { system, user })
}

fn or_default<'a>(v: &'a Option<String>, default: &'a str) -> &'a str {
    match v.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => default,
    }
}
