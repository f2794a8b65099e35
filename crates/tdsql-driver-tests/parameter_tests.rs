//! Parameter Tests
//!
//! `?` placeholder binding: literals and comments that contain `?`,
//! parameter count checks, and many parameters in one statement.

use crate::fixtures::test_database;
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tdsql_core::{TdsqlError, Value};

#[rstest]
#[case::string_literal("select '?', ?", "?")]
#[case::escaped_quote("select 'it''s ?', ?", "it's ?")]
#[case::bracket_identifier("select ? as [really?]", "")]
#[case::line_comment("select ? -- why?\n", "")]
#[case::block_comment("select /* ? */ ?", "")]
#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_question_marks_outside_parameters(
    #[case] sql: &str,
    #[case] literal: &str,
) -> Result<()> {
    let db = test_database().await?;
    let row = db.query_row(sql, &["bound".into()]).await?;

    let values: Vec<Value> = row.scan()?;
    let last = values.last().and_then(Value::as_str);
    assert_eq!(last, Some("bound"));
    if values.len() == 2 {
        assert_eq!(values[0].as_str(), Some(literal));
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_parameter_count_mismatch() -> Result<()> {
    let db = test_database().await?;

    let err = db
        .query("select au_id from authors where au_lname = ? and au_fname = ?", &["Ringer".into()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TdsqlError::ParameterCount {
            expected: 2,
            actual: 1
        }
    ));

    let stmt = db.prepare("select ?").await?;
    assert!(matches!(
        stmt.query(&[]).await,
        Err(TdsqlError::ParameterCount {
            expected: 1,
            actual: 0
        })
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_many_parameters() -> Result<()> {
    let db = test_database().await?;
    let count = 200;
    let sql = format!(
        "select {}",
        std::iter::repeat("?").take(count).collect::<Vec<_>>().join(" + ")
    );
    let params: Vec<Value> = (1..=count as i64).map(Value::from).collect();

    let total = db.query_row(&sql, &params).await?.try_get::<i64>(0)?;
    assert_eq!(total, (1..=count as i64).sum::<i64>());
    Ok(())
}

#[tokio::test]
#[ignore = "requires SQL Server"]
async fn test_string_parameters_are_not_interpolated() -> Result<()> {
    let db = test_database().await?;
    let hostile = "x'; drop table authors; --";

    let result = db
        .query("select au_id from authors where au_lname = ?", &[hostile.into()])
        .await?;
    assert!(!result.has_rows());

    let row = db
        .query_row("select au_lname from authors where au_id = ?", &["267-41-2394".into()])
        .await?;
    assert_eq!(row.try_get::<String>(0)?, "O'Leary");
    Ok(())
}
