use anyhow::Result;

// Print the OpenAPI document so it can be committed or fed to client generators
fn main() -> Result<()> {
    println!("{}", innkeep::api::openapi().to_pretty_json()?);
    Ok(())
}
