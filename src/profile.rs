//! Structured program profile extracted from a normalized page.
//!
//! The heuristics work on [`TextBlock`]s and their heading breadcrumbs, so
//! they tolerate layout changes as long as the page keeps recognizable
//! section titles.

use std::collections::HashSet;

use crate::normalizer::{BlockKind, NormalizedPage, TextBlock};
use crate::program::{Course, CourseKind, ProgramId, ProgramProfile};

const DEFAULT_DURATION: &str = "2 года";
const DEFAULT_FORMAT: &str = "Очная";
const DEFAULT_SEMESTER: u8 = 1;
const DEFAULT_CREDITS: u8 = 3;
const MIN_DESCRIPTION_PARAGRAPH: usize = 100;
const MAX_DESCRIPTION_PARAGRAPHS: usize = 5;

const DESCRIPTION_HEADINGS: &[&str] = &["о программе", "описание", "about"];
const CURRICULUM_HEADINGS: &[&str] = &["учебный план", "curriculum", "дисциплин"];
const ADMISSION_HEADINGS: &[&str] = &["поступ", "admission", "требован"];
const CAREER_HEADINGS: &[&str] = &["карьер", "career", "выпускник", "професси"];
const COMPETENCY_HEADINGS: &[&str] = &["компетенц", "competenc", "навык", "skills", "научитесь"];
/// Disciplines recognized in free page text when no curriculum table parses.
const KNOWN_DISCIPLINES: &[(&str, u8, CourseKind)] = &[
    ("Машинное обучение", 1, CourseKind::Mandatory),
    ("Математическая статистика", 1, CourseKind::Mandatory),
    ("Оптимизация", 1, CourseKind::Mandatory),
    ("Глубокое обучение", 2, CourseKind::Mandatory),
    ("Компьютерное зрение", 2, CourseKind::Elective),
    ("Обработка естественного языка", 2, CourseKind::Elective),
    ("Big Data", 2, CourseKind::Elective),
    ("Reinforcement Learning", 3, CourseKind::Elective),
    ("MLOps", 3, CourseKind::Mandatory),
    ("Генеративные модели", 3, CourseKind::Elective),
];
const TABLE_HEADER_CELLS: &[&str] = &[
    "дисциплина",
    "название",
    "наименование",
    "курс",
    "course",
    "name",
    "discipline",
];

/// Builds a [`ProgramProfile`] for `program` from its normalized page.
pub fn extract_profile(program: ProgramId, page: &NormalizedPage) -> ProgramProfile {
    let blocks = &page.blocks;
    let name = blocks
        .iter()
        .find(|block| block.kind == BlockKind::Heading { level: 1 })
        .map(|block| block.text.clone())
        .unwrap_or_else(|| program.display_name().to_string());

    ProgramProfile {
        program,
        name,
        url: page.metadata.url.clone(),
        description: extract_description(blocks),
        duration: extract_duration(&page.body_text).unwrap_or_else(|| DEFAULT_DURATION.to_string()),
        format: extract_format(&page.body_text).to_string(),
        courses: extract_courses(program, blocks, &page.body_text),
        admission_requirements: list_items_under(blocks, ADMISSION_HEADINGS),
        career_prospects: list_items_under(blocks, CAREER_HEADINGS),
        key_competencies: list_items_under(blocks, COMPETENCY_HEADINGS),
    }
}

fn heading_matches(block: &TextBlock, needles: &[&str]) -> bool {
    block.section_path.iter().any(|heading| {
        let title = heading.title.to_lowercase();
        needles.iter().any(|needle| title.contains(needle))
    })
}

fn nearest_heading_matches(block: &TextBlock, needles: &[&str]) -> bool {
    block.section_path.last().is_some_and(|heading| {
        let title = heading.title.to_lowercase();
        needles.iter().any(|needle| title.contains(needle))
    })
}

fn extract_description(blocks: &[TextBlock]) -> String {
    let dedicated: Vec<&str> = blocks
        .iter()
        .filter(|block| block.kind == BlockKind::Paragraph)
        .filter(|block| nearest_heading_matches(block, DESCRIPTION_HEADINGS))
        .map(|block| block.text.as_str())
        .collect();
    if !dedicated.is_empty() {
        return dedicated.join(" ");
    }

    blocks
        .iter()
        .filter(|block| block.kind == BlockKind::Paragraph)
        .filter(|block| block.text.chars().count() > MIN_DESCRIPTION_PARAGRAPH)
        .take(MAX_DESCRIPTION_PARAGRAPHS)
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_duration(body: &str) -> Option<String> {
    let words: Vec<&str> = body.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        let number = pair[0].trim_matches(|ch: char| !ch.is_ascii_digit());
        if number.is_empty() || number.parse::<u8>().is_err() {
            return None;
        }
        let unit = pair[1]
            .trim_matches(|ch: char| !ch.is_alphabetic())
            .to_lowercase();
        let is_unit = unit.starts_with("год") || unit == "лет" || unit.starts_with("year");
        is_unit.then(|| format!("{number} {unit}"))
    })
}

fn extract_format(body: &str) -> &'static str {
    let lower = body.to_lowercase();
    if lower.contains("заочн") || lower.contains("part-time") {
        "Заочная"
    } else {
        DEFAULT_FORMAT
    }
}

fn extract_courses(program: ProgramId, blocks: &[TextBlock], body: &str) -> Vec<Course> {
    let courses = courses_from_tables(program, blocks);
    if courses.is_empty() {
        courses_mentioned_in(program, body)
    } else {
        courses
    }
}

fn courses_mentioned_in(program: ProgramId, body: &str) -> Vec<Course> {
    let text = body.to_lowercase();
    KNOWN_DISCIPLINES
        .iter()
        .filter(|(name, _, _)| text.contains(&name.to_lowercase()))
        .map(|&(name, semester, kind)| Course {
            name: name.to_string(),
            program,
            semester,
            credits: DEFAULT_CREDITS,
            kind,
            description: String::new(),
            prerequisites: Vec::new(),
            skills: Vec::new(),
        })
        .collect()
}

fn courses_from_tables(program: ProgramId, blocks: &[TextBlock]) -> Vec<Course> {
    let mut seen = HashSet::new();
    let mut courses = Vec::new();

    for block in blocks {
        if block.kind != BlockKind::TableRow || block.cells.len() < 2 {
            continue;
        }
        if !heading_matches(block, CURRICULUM_HEADINGS) {
            continue;
        }
        let name = block.cells[0].trim();
        if name.is_empty() || TABLE_HEADER_CELLS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        if !seen.insert(name.to_lowercase()) {
            continue;
        }

        let rest = &block.cells[1..];
        let numbers: Vec<u8> = rest
            .iter()
            .filter_map(|cell| leading_number(cell))
            .collect();
        let kind = rest
            .iter()
            .find_map(|cell| CourseKind::from_label(cell))
            .unwrap_or(CourseKind::Mandatory);

        courses.push(Course {
            name: name.to_string(),
            program,
            semester: numbers.first().copied().unwrap_or(DEFAULT_SEMESTER),
            credits: numbers.get(1).copied().unwrap_or(DEFAULT_CREDITS),
            kind,
            description: String::new(),
            prerequisites: Vec::new(),
            skills: Vec::new(),
        });
    }

    courses
}

fn leading_number(cell: &str) -> Option<u8> {
    let digits: String = cell
        .trim()
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn list_items_under(blocks: &[TextBlock], needles: &[&str]) -> Vec<String> {
    blocks
        .iter()
        .filter(|block| block.kind == BlockKind::ListItem)
        .filter(|block| nearest_heading_matches(block, needles))
        .map(|block| block.text.clone())
        .collect()
}
