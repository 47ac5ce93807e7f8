//! CLI `score` and `gift` commands.

use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::gifts::{self, GiftKind};
use rapport::memory::scoring;

/// Print the relationship score and stage for a pair.
pub fn score(config: &RapportConfig, user: &str, character: &str) -> Result<()> {
    let conn = super::open(config)?;
    let result = scoring::relationship_for(&conn, &config.characters, user, character)?;

    println!("Score:  {:.1}", result.score);
    println!("Stage:  {}", result.stage);
    Ok(())
}

/// Apply a tip or gift bonus and print the resulting vector.
pub fn gift(config: &RapportConfig, user: &str, character: &str, amount: u64, kind: GiftKind) -> Result<()> {
    let conn = super::open(config)?;
    let outcome = gifts::apply_gift(&conn, &config.characters, user, character, amount, kind)?;

    println!("Tier:        {} (x{})", outcome.bonus.tier, outcome.bonus.multiplier);
    println!("Affection:   {:.1}", outcome.vector.affection);
    println!("Trust:       {:.1}", outcome.vector.trust);
    println!("Jealousy:    {:.1}", outcome.vector.jealousy);
    println!("Playfulness: {:.1}", outcome.vector.playfulness);
    println!("Clinginess:  {:.1}", outcome.vector.clinginess);
    Ok(())
}
