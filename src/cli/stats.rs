use anyhow::Result;

use rapport::config::RapportConfig;

/// Display engine statistics in the terminal.
pub fn stats(config: &RapportConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = rapport::db::open_database(&db_path)?;

    let response = rapport::memory::stats::engine_stats(
        &conn,
        config.decay.prune_salience_floor,
        Some(&db_path),
    )?;

    println!("Engine Statistics");
    println!("{}", "=".repeat(40));
    println!("  Users:               {}", response.distinct_users);
    println!();

    println!("Rows:");
    for (table, count) in &response.rows_by_table {
        println!("  {:<20} {}", table, count);
    }
    println!();

    if let Some(mean) = response.mean_salience {
        println!("Mean salience:         {mean:.3}");
    }
    println!("Below prune floor:     {}", response.episodes_below_floor);
    println!("Database size:         {} bytes", response.db_size_bytes);

    if let Some(ref oldest) = response.oldest_episode {
        println!("Oldest episode:        {oldest}");
    }
    if let Some(ref newest) = response.newest_episode {
        println!("Newest episode:        {newest}");
    }

    Ok(())
}
