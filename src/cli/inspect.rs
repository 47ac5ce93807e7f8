//! CLI `inspect` command — display the memory bundle for one pair.

use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::bundle::get_memory_bundle;

pub fn inspect(config: &RapportConfig, user: &str, character: &str, limit: usize) -> Result<()> {
    let conn = super::open(config)?;
    let bundle = get_memory_bundle(&conn, &config.characters, user, character, limit)?;

    println!("Pair: {user} / {character}");
    println!("{}", "=".repeat(50));
    println!("  Conversations:  {}", bundle.total_conversations);
    println!(
        "  Relationship:   {} ({:.1})",
        bundle.relationship.stage, bundle.relationship.score
    );
    let v = &bundle.emotional_state;
    println!(
        "  Vector:         affection {:.1}, trust {:.1}, jealousy {:.1}, playfulness {:.1}, clinginess {:.1}",
        v.affection, v.trust, v.jealousy, v.playfulness, v.clinginess
    );

    if let Some(ref facts) = bundle.facts {
        println!();
        println!("Facts:");
        if let Some(ref name) = facts.display_name {
            println!("  Name:           {name}");
        }
        if let Some(ref occupation) = facts.occupation {
            println!("  Occupation:     {occupation}");
        }
        for (key, value) in &facts.favorites {
            println!("  Favorite {key}: {value}");
        }
        if !facts.tags.is_empty() {
            let tags: Vec<&str> = facts.tags.iter().map(String::as_str).collect();
            println!("  Tags:           {}", tags.join(", "));
        }
    }

    if !bundle.episodes.is_empty() {
        println!();
        println!("Episodes:");
        for ep in &bundle.episodes {
            println!(
                "  [{:.2}] {} (refs {}, {})",
                ep.salience,
                ep.summary,
                ep.reference_count,
                ep.created_at.format("%Y-%m-%d")
            );
        }
    }

    Ok(())
}
