use super::*;

fn leaf_secrets(count: usize) -> Vec<Secret> {
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; SECRET_SIZE];
            bytes[0] = i as u8;
            bytes[31] = 0xa5;
            Secret::from_bytes(bytes)
        })
        .collect()
}

/// One tree per participant: everyone sees every public key, but each
/// participant holds the private key of its own leaf only.
fn participant_trees(suite: CipherSuite, count: usize) -> Result<Vec<RatchetTree>> {
    let secrets = leaf_secrets(count);
    let keypairs = secrets
        .iter()
        .map(|s| DHPrivateKey::derive(suite, s.as_bytes()))
        .collect::<Result<Vec<_>>>()?;

    let mut trees = vec![];
    for me in 0..count {
        let mut tree = RatchetTree::new(suite);
        for (i, keypair) in keypairs.iter().enumerate() {
            let private = (i == me).then(|| keypair.clone());
            tree.add_leaf(LeafIndex(i as u32), keypair.public_key().clone(), private)?;
        }
        trees.push(tree);
    }
    Ok(trees)
}

#[test]
fn add_leaf_grows_the_array() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut tree = RatchetTree::new(suite);
    for i in 0..5u32 {
        let keypair = DHPrivateKey::generate(suite)?;
        tree.add_leaf(LeafIndex(i), keypair.public_key().clone(), None)?;
        assert_eq!(tree.leaf_count(), i + 1);
        assert_eq!(tree.size(), (2 * i + 1) as usize);
    }

    // Leaves land at even indices, untouched by later growth
    for i in 0..5u32 {
        assert!(!tree.leaf(LeafIndex(i)).unwrap().is_blank());
    }
    assert!(tree
        .add_leaf(
            LeafIndex(7),
            DHPrivateKey::generate(suite)?.public_key().clone(),
            None
        )
        .is_err());
    Ok(())
}

#[test]
fn add_leaf_refuses_an_occupied_slot() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut tree = RatchetTree::from_leaf_secrets(suite, &leaf_secrets(2))?;
    let keypair = DHPrivateKey::generate(suite)?;
    assert!(matches!(
        tree.add_leaf(LeafIndex(1), keypair.public_key().clone(), None),
        Err(Error::DuplicateLeaf)
    ));

    // After blanking, the same slot takes a new member
    tree.blank_path(LeafIndex(1))?;
    tree.add_leaf(LeafIndex(1), keypair.public_key().clone(), None)?;
    Ok(())
}

#[test]
fn resolution_skips_blank_subtrees() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut tree = RatchetTree::from_leaf_secrets(suite, &leaf_secrets(4))?;

    // Fresh tree: internal nodes are blank, so the root resolves to the
    // four leaves
    assert_eq!(
        tree.resolution(NodeIndex(3)),
        vec![NodeIndex(0), NodeIndex(2), NodeIndex(4), NodeIndex(6)]
    );

    tree.blank_path(LeafIndex(1))?;
    assert_eq!(
        tree.resolution(NodeIndex(3)),
        vec![NodeIndex(0), NodeIndex(4), NodeIndex(6)]
    );
    assert_eq!(tree.resolution(NodeIndex(2)), vec![]);

    // A filled node resolves to itself
    assert_eq!(tree.resolution(NodeIndex(0)), vec![NodeIndex(0)]);
    Ok(())
}

#[test]
fn set_path_fills_the_direct_path() -> Result<()> {
    let suite = CipherSuite::P256_SHA256_AES128GCM;
    let mut tree = RatchetTree::from_leaf_secrets(suite, &leaf_secrets(4))?;

    let root = tree.set_path(LeafIndex(0), &Secret::random())?;
    assert_eq!(tree.root_secret(), Some(&root));
    for x in [0u32, 1, 3] {
        let node = tree.node(NodeIndex(x)).unwrap();
        assert!(node.private_key().is_some());
    }
    // Off-path nodes are untouched
    assert!(tree.node(NodeIndex(5)).unwrap().is_blank());
    Ok(())
}

#[test]
fn update_reaches_only_nonblank_resolutions() -> Result<()> {
    // Eight members, leaves 2 and 5 blanked: the update from leaf 0 must
    // seal one secret per member of each co-path resolution and skip the
    // blanked subtrees entirely.
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut trees = participant_trees(suite, 8)?;
    for tree in &mut trees {
        tree.blank_path(LeafIndex(2))?;
        tree.blank_path(LeafIndex(5))?;
    }

    let leaf_secret = Secret::random();
    let (path, sender_root) = trees[0].encrypt_path(LeafIndex(0), &leaf_secret)?;

    assert_eq!(path.nodes.len(), 4);
    assert_eq!(path.nodes[0].node_secrets.len(), 0);
    assert_eq!(path.nodes[1].node_secrets.len(), 1);
    assert_eq!(path.nodes[2].node_secrets.len(), 1);
    assert_eq!(path.nodes[3].node_secrets.len(), 3);

    for j in [1u32, 3, 4, 6, 7] {
        let root = trees[j as usize].decrypt_path(LeafIndex(j), LeafIndex(0), &path)?;
        assert_eq!(root, sender_root);
        assert_eq!(trees[j as usize], trees[0]);
    }
    Ok(())
}

#[test]
fn decrypt_path_rejects_tampered_public_keys() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut trees = participant_trees(suite, 4)?;

    let (mut path, _) = trees[0].encrypt_path(LeafIndex(0), &Secret::random())?;
    // Swap the root's public key for an unrelated one
    let bogus = DHPrivateKey::generate(suite)?;
    let last = path.nodes.len() - 1;
    path.nodes[last].public_key = bogus.public_key().clone();

    assert!(matches!(
        trees[1].decrypt_path(LeafIndex(1), LeafIndex(0), &path),
        Err(Error::InvalidDirectPath)
    ));
    Ok(())
}

#[test]
fn decrypt_path_needs_a_reachable_secret() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut trees = participant_trees(suite, 4)?;

    let (path, _) = trees[0].encrypt_path(LeafIndex(0), &Secret::random())?;

    // A view with no private keys at all cannot recover anything
    let mut stranger = RatchetTree::new(suite);
    for i in 0..4u32 {
        let public = trees[0]
            .leaf(LeafIndex(i))
            .and_then(RatchetTreeNode::public_key)
            .unwrap()
            .clone();
        stranger.add_leaf(LeafIndex(i), public, None)?;
    }
    assert!(matches!(
        stranger.decrypt_path(LeafIndex(1), LeafIndex(0), &path),
        Err(Error::UndecryptablePathSecret)
    ));
    Ok(())
}

#[test]
fn tree_equality_ignores_private_keys() -> Result<()> {
    let suite = CipherSuite::P256_SHA256_AES128GCM;
    let trees = participant_trees(suite, 3)?;
    assert_eq!(trees[0], trees[1]);
    assert_eq!(trees[1], trees[2]);

    let mut other = trees[0].clone();
    other.blank_path(LeafIndex(2))?;
    assert_ne!(other, trees[0]);
    Ok(())
}

#[test]
fn tree_marshal_round_trip() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut tree = RatchetTree::from_leaf_secrets(suite, &leaf_secrets(5))?;
    tree.set_path(LeafIndex(3), &Secret::random())?;
    tree.blank_path(LeafIndex(1))?;

    let raw = tree.serialize_detached()?;
    let parsed = RatchetTree::deserialize(&mut raw.clone(), suite)?;
    assert_eq!(parsed, tree);
    assert_eq!(parsed.serialize_detached()?, raw);

    // An even node count is not a valid tree
    let mut bad = bytes::BytesMut::new();
    serialize_vector(2, 4, &mut bad, |_, b| serialize_optional(false, b))?;
    assert!(matches!(
        RatchetTree::deserialize(&mut bad.freeze(), suite),
        Err(Error::InvalidTreeSize)
    ));
    Ok(())
}
