//! Domain types shared by every pipeline stage: the two programs, their
//! curriculum profile, and the chunks that get embedded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::normalizer::SectionHeading;

/// The two master's programs the advisor knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProgramId {
    /// "Искусственный интеллект".
    Ai,
    /// "Управление ИИ-продуктами / AI Product".
    AiProduct,
}

impl ProgramId {
    /// Every program, in a stable order.
    pub const ALL: [ProgramId; 2] = [ProgramId::Ai, ProgramId::AiProduct];

    /// Stable identifier used in file names and storage rows.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::AiProduct => "ai_product",
        }
    }

    /// Human-readable program name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::AiProduct => "AI Product",
        }
    }

    /// Public page the collector scrapes by default.
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Ai => "https://abit.itmo.ru/program/master/ai",
            Self::AiProduct => "https://abit.itmo.ru/program/master/ai_product",
        }
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Raised when a program slug is not one of the two known programs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown program '{0}'; expected 'ai' or 'ai_product'")]
pub struct UnknownProgram(pub String);

impl FromStr for ProgramId {
    type Err = UnknownProgram;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "ai" => Ok(Self::Ai),
            "ai_product" => Ok(Self::AiProduct),
            _ => Err(UnknownProgram(value.to_string())),
        }
    }
}

/// How a course counts toward the degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseKind {
    /// Required for every student.
    Mandatory,
    /// Chosen from a pool of electives.
    Elective,
    /// Extra-curricular, does not count toward the required credits.
    Optional,
}

impl CourseKind {
    /// Classifies a free-text label from the curriculum table.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("выбор") || label.contains("elective") {
            Some(Self::Elective)
        } else if label.contains("факультатив") || label.contains("optional") {
            Some(Self::Optional)
        } else if label.contains("обязател")
            || label.contains("mandatory")
            || label.contains("required")
        {
            Some(Self::Mandatory)
        } else {
            None
        }
    }

    /// Label used when rendering text for embeddings and replies.
    pub fn label(self) -> &'static str {
        match self {
            Self::Mandatory => "обязательная",
            Self::Elective => "выборная",
            Self::Optional => "факультатив",
        }
    }
}

/// One discipline from a program's curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Discipline title.
    pub name: String,
    /// Owning program.
    pub program: ProgramId,
    /// Semester (1-based) the course is taught in.
    pub semester: u8,
    /// Credit units (ECTS-like).
    pub credits: u8,
    /// Mandatory, elective or optional.
    pub kind: CourseKind,
    /// Short description, when the page has one.
    #[serde(default)]
    pub description: String,
    /// Courses or skills expected beforehand.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Skills the course teaches.
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Course {
    /// Text embedded for a single course.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Программа: {}\nКурс: {}\nСеместр: {}\nКредиты: {}\nТип: {}",
            self.program.display_name(),
            self.name,
            self.semester,
            self.credits,
            self.kind.label()
        );
        if !self.description.is_empty() {
            text.push_str("\nОписание: ");
            text.push_str(&self.description);
        }
        if !self.prerequisites.is_empty() {
            text.push_str("\nПререквизиты: ");
            text.push_str(&self.prerequisites.join(", "));
        }
        if !self.skills.is_empty() {
            text.push_str("\nНавыки: ");
            text.push_str(&self.skills.join(", "));
        }
        text
    }
}

/// Structured summary of a program page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramProfile {
    /// Which program this profile describes.
    pub program: ProgramId,
    /// Title as shown on the page.
    pub name: String,
    /// Page URL.
    pub url: String,
    /// Free-form description.
    pub description: String,
    /// Study duration, e.g. "2 года".
    pub duration: String,
    /// Study format, e.g. "Очная".
    pub format: String,
    /// Curriculum entries.
    pub courses: Vec<Course>,
    /// Admission requirements.
    pub admission_requirements: Vec<String>,
    /// Career paths after graduation.
    pub career_prospects: Vec<String>,
    /// Competencies the program develops.
    pub key_competencies: Vec<String>,
}

impl ProgramProfile {
    /// Overview text embedded alongside the page chunks.
    pub fn render_summary(&self) -> String {
        let mut text = format!(
            "Программа: {}\nURL: {}\n\nОписание: {}\n\nСрок обучения: {}\nФормат: {}",
            self.name,
            self.url,
            if self.description.is_empty() {
                "нет описания"
            } else {
                self.description.as_str()
            },
            self.duration,
            self.format
        );
        push_list(
            &mut text,
            "Требования для поступления",
            &self.admission_requirements,
        );
        push_list(&mut text, "Карьерные перспективы", &self.career_prospects);
        push_list(&mut text, "Ключевые компетенции", &self.key_competencies);
        text
    }

    /// Elective courses only.
    pub fn electives(&self) -> impl Iterator<Item = &Course> {
        self.courses
            .iter()
            .filter(|course| course.kind == CourseKind::Elective)
    }
}

fn push_list(text: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    text.push_str("\n\n");
    text.push_str(title);
    text.push(':');
    for item in items {
        text.push_str("\n- ");
        text.push_str(item);
    }
}

/// Whether a chunk came from page prose or from a single curriculum entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Page text or the profile summary.
    General,
    /// One course.
    Course,
}

impl ChunkKind {
    /// Storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Course => "course",
        }
    }

    /// Inverse of [`ChunkKind::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(Self::General),
            "course" => Some(Self::Course),
            _ => None,
        }
    }
}

/// Retrievable unit of program text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumChunk {
    /// Program the text belongs to.
    pub program: ProgramId,
    /// Page the text was scraped from.
    pub source_url: String,
    /// Heading breadcrumb inside the page.
    #[serde(default)]
    pub section: Vec<SectionHeading>,
    /// Page prose or course entry.
    pub kind: ChunkKind,
    /// Position within the program's chunk list.
    pub ordinal: usize,
    /// Course name for [`ChunkKind::Course`] chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    /// Chunk body.
    pub text: String,
    /// Rough token count.
    pub token_estimate: usize,
}

impl CurriculumChunk {
    /// Breadcrumb rendered as `A > B > C`.
    pub fn section_label(&self) -> String {
        self.section
            .iter()
            .map(|heading| heading.title.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}
