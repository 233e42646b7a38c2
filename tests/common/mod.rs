//! Legacy question fixtures shared by the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Shared envelope plus `body`, keyed by `question_id`.
pub fn question(question_id: &str, question_type: &str, body: Value) -> Value {
    let mut record = json!({
        "question_id": question_id,
        "type": question_type,
        "stem": "<p>Read carefully.</p>",
        "language": "en",
        "country": "us",
        "subject": "Science",
        "grade": 4,
        "section_id": 31,
        "explanation": "<p>Because the text says so.</p>"
    });
    if let (Some(target), Value::Object(extra)) = (record.as_object_mut(), body) {
        target.extend(extra);
    }
    record
}

fn choice(kind: &str, content: &str, index: i64, fixed_order: i64) -> Value {
    json!({
        "type": kind,
        "html_content": content,
        "values": [],
        "unit": null,
        "index": index,
        "fixed_order": fixed_order
    })
}

pub fn mcq(question_id: &str) -> Value {
    question(
        question_id,
        "mcq",
        json!({
            "choices": [
                choice("distractor", "<p>Moon</p>", 1, 2),
                choice("key", "<p>Sun</p>", 0, 1),
                choice("distractor", "<p>Mars</p>", 2, 3)
            ]
        }),
    )
}

pub fn mrq(question_id: &str) -> Value {
    question(
        question_id,
        "mrq",
        json!({
            "choices": [
                choice("key", "<p>2</p>", 0, 1),
                choice("distractor", "<p>9</p>", 1, 2),
                choice("key", "<p>4</p>", 2, 3)
            ]
        }),
    )
}

pub fn opinion(question_id: &str) -> Value {
    question(
        question_id,
        "opinion",
        json!({
            "choices": [
                choice("distractor", "<p>Agree</p>", 0, 1),
                choice("distractor", "<p>Disagree</p>", 1, 2)
            ]
        }),
    )
}

pub fn ordering(question_id: &str) -> Value {
    question(
        question_id,
        "oq",
        json!({
            "direction": "vertical",
            "choices": [
                choice("distractor", "<p>Seed</p>", 0, 1),
                choice("distractor", "<p>Tree</p>", 2, 2),
                choice("distractor", "<p>Sprout</p>", 1, 3)
            ]
        }),
    )
}

pub fn matching(question_id: &str) -> Value {
    let paired = |content: &str, index: i64, fixed_order: i64, group: &str| {
        let mut c = choice("distractor", content, index, fixed_order);
        c["group"] = json!(group);
        c
    };
    question(
        question_id,
        "matching",
        json!({
            "choices": [
                paired("<p>Dog</p>", 0, 1, "animals"),
                paired("<p>Cat</p>", 1, 2, "animals"),
                paired("<p>Meow</p>", 1, 3, "sounds"),
                paired("<p>Bark</p>", 0, 4, "sounds")
            ]
        }),
    )
}

pub fn counting(question_id: &str) -> Value {
    question(
        question_id,
        "counting",
        json!({ "choices": [], "answer": "6", "grid_size": "2×3" }),
    )
}

pub fn frq(question_id: &str) -> Value {
    question(
        question_id,
        "frq_ai",
        json!({
            "choices": [],
            "answer": "Photosynthesis",
            "ai": { "ai_template_id": 123456789012u64 }
        }),
    )
}

pub fn string(question_id: &str) -> Value {
    question(
        question_id,
        "string",
        json!({ "choices": null, "answer": ["cat", " kitten "] }),
    )
}

pub fn gap_text(question_id: &str) -> Value {
    let mut record = question(
        question_id,
        "gapText",
        json!({
            "choices": [],
            "gap_text_keys": [
                { "value": "cat", "fixed_order": 2, "correct_order": 1 },
                { "value": "mat", "fixed_order": 1, "correct_order": 2 },
                { "value": "hat", "fixed_order": 3, "correct_order": null }
            ]
        }),
    );
    record["stem"] = json!(
        "<p>The <span data-node-variation=\"gap\"></span> sat on the <span data-node-variation=\"gap\"></span>.</p>"
    );
    record
}

pub fn puzzle(question_id: &str) -> Value {
    question(
        question_id,
        "puzzle",
        json!({
            "puzzleRows": "2",
            "puzzleColumns": 2,
            "puzzleImageWidth": "400",
            "puzzleImageHeight": 300,
            "puzzleImage": "https://cdn.example.com/map.png",
            "puzzleImageSplited": ["p1.png", "p2.png", { "src": "p3.png" }, "p4.png"]
        }),
    )
}

pub fn input_box(question_id: &str) -> Value {
    question(
        question_id,
        "input_box",
        json!({
            "answer": { "value": "2.5", "constrains": { "type": "decimal" }, "unit": "cm" }
        }),
    )
}

/// One valid record per bundled type, with its expected target `type`.
pub fn all_valid() -> Vec<(Value, &'static str)> {
    vec![
        (mcq("MCQ1"), "mcq"),
        (mrq("MRQ1"), "mrq"),
        (opinion("OPN1"), "opinion"),
        (ordering("OQ1"), "ordering"),
        (matching("MAT1"), "matching"),
        (counting("CNT1"), "counting"),
        (frq("FRQ1"), "frq"),
        (string("STR1"), "string"),
        (gap_text("GAP1"), "gap"),
        (puzzle("PZL1"), "puzzle"),
        (input_box("INP1"), "input"),
    ]
}
