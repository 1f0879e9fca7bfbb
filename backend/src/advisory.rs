//! Canned answers to operator questions, picked by keyword and tank status.

use common::req::{AdvisoryReply, RealtimeSnapshot, TankStatus};

struct Query<'a> {
    words: Vec<String>,
    snapshot: Option<&'a RealtimeSnapshot>,
}

impl<'a> Query<'a> {
    fn new(message: &str, snapshot: Option<&'a RealtimeSnapshot>) -> Self {
        let words = message
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { words, snapshot }
    }

    fn mentions(&self, prefixes: &[&str]) -> bool {
        self.words
            .iter()
            .any(|w| prefixes.iter().any(|p| w.starts_with(p)))
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn status(&self) -> Option<TankStatus> {
        self.snapshot.map(|s| s.status)
    }

    fn asks_about_level(&self) -> bool {
        self.mentions(&["level", "water", "tank", "status"])
    }
}

struct Rule {
    name: &'static str,
    applies: fn(&Query) -> bool,
    reply: fn(&Query) -> String,
}

fn level(q: &Query) -> String {
    match q.snapshot {
        Some(s) => format!(
            "Tank {} is at {:.1} cm ({:.0}%).",
            s.tank_code, s.fill_height_cm, s.water_level_percent
        ),
        None => String::new(),
    }
}

// first match wins
const RULES: &[Rule] = &[
    Rule {
        name: "critical_level",
        applies: |q| q.status() == Some(TankStatus::Critical),
        reply: |q| {
            format!(
                "{} The water level is critical. Refill the tank now and check the inlet and \
                 for leaks before the fish are stressed.",
                level(q)
            )
        },
    },
    Rule {
        name: "overflow",
        applies: |q| q.status() == Some(TankStatus::Warn) || q.mentions(&["overflow"]),
        reply: |q| {
            if q.status() == Some(TankStatus::Warn) {
                format!(
                    "{} The tank is above its maximum height. Close the inlet and check the \
                     overflow drain.",
                    level(q)
                )
            } else {
                // asked about it, but the tank is not over its maximum
                format!(
                    "{} If the tank overflows, close the inlet and check the overflow drain.",
                    level(q)
                )
            }
        },
    },
    Rule {
        name: "low_level",
        applies: |q| q.status() == Some(TankStatus::Low),
        reply: |q| {
            format!(
                "{} The water level is below the minimum. Top the tank up to its ideal height.",
                level(q)
            )
        },
    },
    Rule {
        name: "oxygen",
        applies: |q| q.mentions(&["oxygen", "aerat", "gasp", "bubbl"]),
        reply: |_| {
            "Fish gasping at the surface usually means low dissolved oxygen. Run the aerators, \
             reduce feeding and avoid handling the fish until it recovers."
                .to_string()
        },
    },
    Rule {
        name: "feeding",
        applies: |q| q.mentions(&["feed", "food", "pellet"]),
        reply: |_| {
            "Feed two to three times a day, only as much as the fish eat within five minutes. \
             Remove uneaten food to keep the water clean."
                .to_string()
        },
    },
    Rule {
        name: "disease",
        applies: |q| q.mentions(&["disease", "sick", "spot", "fungus", "dead", "mortal"]),
        reply: |_| {
            "Isolate affected fish, record the symptoms in a disease report and ask the vet \
             before treating the whole tank."
                .to_string()
        },
    },
    Rule {
        name: "ph",
        applies: |q| q.has_word("ph") || q.mentions(&["acid", "alkal"]),
        reply: |_| {
            "Keep the pH between 6.5 and 8.5. Change part of the water gradually if it drifts \
             out of range."
                .to_string()
        },
    },
    Rule {
        name: "level_good",
        applies: |q| q.status() == Some(TankStatus::Good) && q.asks_about_level(),
        reply: |q| format!("{} The water level is good.", level(q)),
    },
    Rule {
        name: "no_data",
        applies: |q| q.asks_about_level() && matches!(q.status(), None | Some(TankStatus::NoData)),
        reply: |_| {
            "There is no recent reading for this tank. Check that the sensor is powered and \
             connected."
                .to_string()
        },
    },
];

const DEFAULT_RULE: &str = "default";

pub fn advise(message: &str, snapshot: Option<&RealtimeSnapshot>) -> AdvisoryReply {
    let query = Query::new(message, snapshot);

    match RULES.iter().find(|rule| (rule.applies)(&query)) {
        Some(rule) => AdvisoryReply {
            reply: (rule.reply)(&query).trim().to_string(),
            rule: rule.name.to_string(),
        },
        None => AdvisoryReply {
            reply: "Ask about water level, oxygen, feeding, disease or pH.".to_string(),
            rule: DEFAULT_RULE.to_string(),
        },
    }
}
