fn main() -> anyhow::Result<()> {
    atomic_installer::run()
}
