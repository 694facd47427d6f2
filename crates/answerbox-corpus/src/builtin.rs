//! The built-in question catalog.

use answerbox_core::QaEntry;

/// Build the full catalog in its canonical order.
///
/// Order matters: entry indices are the identity the matcher reports
/// back, so new entries go at the end of their topic block and nothing
/// is ever reordered.
pub fn catalog() -> Vec<QaEntry> {
    let mut entries = Vec::new();

    // Science
    for (q, a) in [
        (
            "What is the chemical symbol for gold?",
            "The chemical symbol for gold is Au.",
        ),
        (
            "What is the speed of light?",
            "The speed of light is approximately 299,792,458 meters per second.",
        ),
        (
            "How many bones are there in an adult human body?",
            "An adult human body has 206 bones.",
        ),
        (
            "What is the largest planet in our solar system?",
            "Jupiter is the largest planet in our solar system.",
        ),
        (
            "What gas do plants absorb from the atmosphere during photosynthesis?",
            "Plants absorb carbon dioxide (CO2) from the atmosphere during photosynthesis.",
        ),
        (
            "What is the hardest natural substance on Earth?",
            "Diamond is the hardest natural substance on Earth.",
        ),
        (
            "What is the smallest unit of matter?",
            "The atom is the smallest unit of matter.",
        ),
        (
            "What is the boiling point of water at sea level?",
            "The boiling point of water at sea level is 100°C or 212°F.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "science"));
    }

    // Geography
    for (q, a) in [
        (
            "What is the capital of France?",
            "The capital of France is Paris.",
        ),
        (
            "Which is the longest river in the world?",
            "The Nile River is the longest river in the world.",
        ),
        (
            "What is the smallest country in the world?",
            "Vatican City is the smallest country in the world.",
        ),
        (
            "Which continent has the most countries?",
            "Africa has the most countries with 54 nations.",
        ),
        (
            "What is the highest mountain in the world?",
            "Mount Everest is the highest mountain in the world.",
        ),
        (
            "Which ocean is the largest?",
            "The Pacific Ocean is the largest ocean.",
        ),
        (
            "What is the capital of Australia?",
            "The capital of Australia is Canberra.",
        ),
        (
            "Which desert is the largest in the world?",
            "The Sahara Desert is the largest hot desert in the world.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "geography"));
    }

    // History
    for (q, a) in [
        (
            "Who was the first person to walk on the moon?",
            "Neil Armstrong was the first person to walk on the moon.",
        ),
        (
            "In which year did World War II end?",
            "World War II ended in 1945.",
        ),
        (
            "Who painted the Mona Lisa?",
            "Leonardo da Vinci painted the Mona Lisa.",
        ),
        (
            "Which ancient wonder of the world was located in Alexandria?",
            "The Lighthouse of Alexandria was located in Alexandria.",
        ),
        (
            "Who was the first President of the United States?",
            "George Washington was the first President of the United States.",
        ),
        (
            "In which year did the Berlin Wall fall?",
            "The Berlin Wall fell in 1989.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "history"));
    }

    // General knowledge
    for (q, a) in [
        (
            "How many days are there in a leap year?",
            "There are 366 days in a leap year.",
        ),
        (
            "What is the largest mammal in the world?",
            "The blue whale is the largest mammal in the world.",
        ),
        (
            "How many continents are there?",
            "There are 7 continents in the world.",
        ),
        (
            "What is the currency of Japan?",
            "The currency of Japan is the Yen.",
        ),
        (
            "How many sides does a hexagon have?",
            "A hexagon has 6 sides.",
        ),
        (
            "What is the most spoken language in the world?",
            "Mandarin Chinese is the most spoken language in the world.",
        ),
        (
            "What is the smallest prime number?",
            "2 is the smallest prime number.",
        ),
        (
            "How many minutes are there in a full day?",
            "There are 1,440 minutes in a full day.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "general"));
    }

    // Sports
    for (q, a) in [
        (
            "How often are the Summer Olympic Games held?",
            "The Summer Olympic Games are held every 4 years.",
        ),
        (
            "In which sport would you perform a slam dunk?",
            "You would perform a slam dunk in basketball.",
        ),
        (
            "How many players are on a soccer team on the field at one time?",
            "There are 11 players on a soccer team on the field at one time.",
        ),
        (
            "What is the maximum score possible in ten-pin bowling?",
            "The maximum score possible in ten-pin bowling is 300.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "sports"));
    }

    // Literature & arts
    for (q, a) in [
        (
            "Who wrote 'Romeo and Juliet'?",
            "William Shakespeare wrote 'Romeo and Juliet'.",
        ),
        (
            "What is the first book in the Harry Potter series?",
            "The first book in the Harry Potter series is 'Harry Potter and the Philosopher's Stone' (or 'Sorcerer's Stone' in the US).",
        ),
        (
            "Who composed 'The Four Seasons'?",
            "Antonio Vivaldi composed 'The Four Seasons'.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "literature"));
    }

    // Technology
    for (q, a) in [
        ("What does 'WWW' stand for?", "WWW stands for World Wide Web."),
        (
            "Who founded Microsoft?",
            "Bill Gates and Paul Allen founded Microsoft.",
        ),
        (
            "What does 'AI' stand for?",
            "AI stands for Artificial Intelligence.",
        ),
        (
            "In what year was the first iPhone released?",
            "The first iPhone was released in 2007.",
        ),
    ] {
        entries.push(QaEntry::with_category(q, a, "technology"));
    }

    entries
}

/// Curated example questions for the category browser.
///
/// Hand-picked showcase set, intentionally short — this is a browsing
/// aid, not an index of the catalog.
pub fn curated_categories() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            "Science",
            vec![
                "What is the chemical symbol for gold?",
                "What is the speed of light?",
                "How many bones are there in an adult human body?",
            ],
        ),
        (
            "Geography",
            vec![
                "What is the capital of France?",
                "Which is the longest river in the world?",
                "What is the smallest country in the world?",
            ],
        ),
        (
            "History",
            vec![
                "Who was the first person to walk on the moon?",
                "In which year did World War II end?",
                "Who painted the Mona Lisa?",
            ],
        ),
        (
            "Sports",
            vec![
                "How often are the Summer Olympic Games held?",
                "In which sport would you perform a slam dunk?",
                "How many players are on a soccer team?",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_well_formed() {
        let entries = catalog();
        assert_eq!(entries.len(), 43);
        for entry in &entries {
            assert!(!entry.question.trim().is_empty());
            assert!(!entry.answer.trim().is_empty());
            assert!(entry.category.is_some());
        }
    }

    #[test]
    fn test_catalog_order_is_stable() {
        // Index identity: first entry is the gold question, the French
        // capital opens the geography block.
        let entries = catalog();
        assert_eq!(entries[0].question, "What is the chemical symbol for gold?");
        assert_eq!(entries[8].question, "What is the capital of France?");
        assert_eq!(entries[8].category.as_deref(), Some("geography"));
    }

    #[test]
    fn test_curated_categories_nonempty() {
        let cats = curated_categories();
        assert_eq!(cats.len(), 4);
        for (name, questions) in &cats {
            assert!(!name.is_empty());
            assert_eq!(questions.len(), 3);
        }
    }
}
