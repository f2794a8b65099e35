//! SELECT Tests
//!
//! Single-row scans, ordered multi-row reads and prepared statements against
//! the seeded `authors` table.

use crate::fixtures::{AUTHORS, test_database};
use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tdsql_core::TdsqlError;

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_query_row_scan() -> Result<()> {
    let db = test_database().await?;

    let row = db
        .query_row(
            "select au_fname, au_lname name from authors where au_id = ?",
            &["172-32-1176".into()],
        )
        .await?;
    let (first, last): (String, String) = row.scan()?;
    assert_eq!(first, "Johnson");
    assert_eq!(last, "White");

    assert_eq!(row.columns(), &["au_fname".to_string(), "name".to_string()]);
    assert_eq!(row.try_get_by_name::<String>("name")?, "White");
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_query_row_no_rows() -> Result<()> {
    let db = test_database().await?;
    let err = db
        .query_row("select au_fname from authors where au_id = ?", &["000-00-0000".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, TdsqlError::NoRows));
    Ok(())
}

/// Rows come back in ORDER BY order whether run ad hoc or prepared
#[rstest]
#[case::ad_hoc(false)]
#[case::prepared(true)]
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_select_ordered(#[case] prepared: bool) -> Result<()> {
    let db = test_database().await?;
    let sql = "select au_fname from authors where au_lname = ? order by au_id";

    let result = if prepared {
        let stmt = db.prepare(sql).await?;
        assert_eq!(stmt.parameter_count(), 1);
        stmt.query(&["Ringer".into()]).await?
    } else {
        db.query(sql, &["Ringer".into()]).await?
    };

    let names = result
        .iter()
        .map(|row| row.try_get::<String>(0))
        .collect::<tdsql_core::Result<Vec<_>>>()?;
    assert_eq!(names, vec!["Anne", "Albert"]);
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_prepared_statement_reused_across_parameters() -> Result<()> {
    let db = test_database().await?;
    let stmt = db
        .prepare("select au_lname, au_fname from authors where au_id = ?")
        .await?;

    for (id, last, first) in AUTHORS {
        let row = stmt
            .query_row(&[(*id).into()])
            .await
            .with_context(|| format!("author {} missing", id))?;
        let scanned: (String, String) = row.scan()?;
        assert_eq!(scanned, (last.to_string(), first.to_string()));
    }

    stmt.close();
    assert!(matches!(
        stmt.query(&["172-32-1176".into()]).await,
        Err(TdsqlError::StatementClosed)
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_empty_result_keeps_columns() -> Result<()> {
    let db = test_database().await?;
    let result = db
        .query("select au_id, au_fname from authors where 1 = 0", &[])
        .await?;
    assert!(!result.has_rows());
    assert_eq!(result.column_names(), vec!["au_id", "au_fname"]);
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_scan_counts_and_nulls() -> Result<()> {
    let db = test_database().await?;
    let row = db
        .query_row(
            "select count(*), cast(null as varchar(10)), max(au_id) from authors where au_lname = ?",
            &["Ringer".into()],
        )
        .await?;
    let (count, missing, max_id): (i64, Option<String>, Option<String>) = row.scan()?;
    assert_eq!(count, 2);
    assert_eq!(missing, None);
    assert_eq!(max_id.as_deref(), Some("998-72-3567"));

    assert!(matches!(row.try_get::<String>(1), Err(TdsqlError::Conversion(_))));
    Ok(())
}
